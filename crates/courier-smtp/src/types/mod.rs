//! Core SMTP types.

mod address;
mod credentials;
mod envelope;
mod extension;
mod message;
mod reply;

pub use address::Address;
pub use credentials::{Credentials, OAuth2Token};
pub use envelope::{DsnNotify, DsnOptions, DsnReturn, Envelope, encode_xtext};
pub use extension::{AuthMechanism, Extension};
pub use message::{Message, SentMessageInfo};
pub use reply::{Reply, ReplyCode};
