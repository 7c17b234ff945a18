//! # courier-smtp
//!
//! Event-driven SMTP client connection (RFC 5321).
//!
//! Operations on an [`SmtpConnection`] return immediately and report their
//! outcome through a one-shot [`Callback`]. Lifecycle is announced through
//! an [`EventEmitter`]: `Connect` when the session is ready, `Error` for a
//! fatal failure and `End` once the connection is gone for good.
//!
//! ## Features
//!
//! - **TLS**: implicit TLS and STARTTLS, with required and opportunistic modes
//! - **Authentication**: PLAIN, LOGIN, XOAUTH2, OAUTHBEARER
//! - **Extensions**: SIZE, 8BITMIME, DSN, SMTPUTF8
//! - **Streaming**: message bodies are read from any `AsyncRead` while sent
//!
//! ## Quick Start
//!
//! ```no_run
//! use courier_smtp::{ConnectionOptions, Event, EventKind, SmtpConnection};
//!
//! # fn main() -> courier_smtp::Result<()> {
//! let options = ConnectionOptions::builder("smtp.example.com")
//!     .port(587)
//!     .build()?;
//! let conn = SmtpConnection::new(options);
//! conn.events().on(EventKind::Error, |event| {
//!     if let Event::Error(err) = event {
//!         eprintln!("connection failed: {err}");
//!     }
//! });
//! conn.connect(Box::new(|result: courier_smtp::Result<()>| {
//!     if result.is_ok() {
//!         println!("connected");
//!     }
//! }));
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`command`]: SMTP command builders
//! - [`connection`]: Connection, options and transport stream
//! - [`parser`]: Reply parser
//! - [`sasl`]: SASL payload encoding
//! - [`types`]: Addresses, envelopes, messages, replies

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod command;
pub mod connection;
mod error;
pub mod event;
pub mod parser;
pub mod sasl;
pub mod socket;
pub mod types;

pub use connection::{
    Callback, ConnectionOptions, ConnectionOptionsBuilder, ServerInfo, SmtpConnection, TlsOptions,
};
pub use error::{ErrorCode, Result, SmtpError};
pub use event::{Event, EventEmitter, EventKind, ListenerId};
pub use socket::{ClosedSignal, SocketHandle};
pub use types::{
    Address, AuthMechanism, Credentials, DsnNotify, DsnOptions, DsnReturn, Envelope, Extension,
    Message, OAuth2Token, Reply, ReplyCode, SentMessageInfo,
};
