//! # courier
//!
//! Future-returning SMTP client.
//!
//! [`SmtpClient`] drives an event-driven, callback-style connection (by
//! default [`courier_smtp::SmtpConnection`]) and exposes every operation as
//! a single future. The connection may end on its own at any moment; the
//! client guarantees that:
//!
//! - no operation waits forever because the connection ended instead of
//!   completing it,
//! - listeners attached for an operation are gone once it settles,
//! - operations after the end fail at once with [`Error::Ended`],
//! - `quit`, `close` and `destroy` are idempotent and always resolve.
//!
//! Error and response text handed back to the caller is reduced to printable
//! ASCII, see [`sanitize`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use courier::{ConnectionOptions, Envelope, SmtpClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = ConnectionOptions::builder("localhost")
//!         .port(2525)
//!         .ignore_tls(true)
//!         .build()?;
//!     let client = SmtpClient::new(options);
//!     client.connect().await?;
//!
//!     let envelope = Envelope::parse("sender@example.com", ["recipient@example.net"])?;
//!     let info = client
//!         .send(envelope, "Subject: test\r\n\r\nTest\r\n".into())
//!         .await?;
//!     assert_eq!(info.accepted, ["recipient@example.net"]);
//!
//!     client.quit().await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod client;
mod error;
mod pending;
pub mod sanitize;
mod transport;

pub use client::SmtpClient;
pub use error::{Error, Operation, Result};
pub use transport::Transport;

pub use courier_smtp::{
    Address, AuthMechanism, Callback, ConnectionOptions, ConnectionOptionsBuilder, Credentials,
    DsnNotify, DsnOptions, DsnReturn, Envelope, ErrorCode, Event, EventEmitter, EventKind,
    ListenerId, Message, OAuth2Token, SentMessageInfo, SmtpConnection, SmtpError, SocketHandle,
    TlsOptions,
};
