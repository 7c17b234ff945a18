//! Event-driven SMTP connection.
//!
//! [`SmtpConnection`] runs each operation on a background task and reports
//! the outcome through a callback. Fatal failures are announced as
//! [`Event::Error`](crate::Event::Error) followed by
//! [`Event::End`](crate::Event::End); the callback of the failed operation is
//! then never invoked.

mod client;
mod options;
mod session;
mod stream;
mod tls;

pub use client::{Callback, SmtpConnection};
pub use options::{ConnectionOptions, ConnectionOptionsBuilder, TlsOptions};
pub use stream::{BoxedIo, Io, SmtpStream, dial};

use std::collections::HashSet;

use crate::types::{AuthMechanism, Extension, Reply};

/// Server capabilities from the EHLO/HELO reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerInfo {
    /// Server hostname as announced in the greeting reply.
    pub hostname: String,
    /// Supported extensions.
    pub extensions: HashSet<Extension>,
}

impl ServerInfo {
    /// Builds capabilities from an EHLO reply. The first line is the server
    /// name, every further line one extension.
    #[must_use]
    pub fn from_ehlo(reply: &Reply) -> Self {
        let hostname = reply
            .message
            .first()
            .and_then(|line| line.split_whitespace().next())
            .unwrap_or("unknown")
            .to_string();
        let extensions = reply.message.iter().skip(1).map(|line| Extension::parse(line)).collect();
        Self {
            hostname,
            extensions,
        }
    }

    /// Checks if the server supports an extension.
    #[must_use]
    pub fn supports(&self, ext: &Extension) -> bool {
        self.extensions.contains(ext)
    }

    /// Checks if STARTTLS is supported.
    #[must_use]
    pub fn supports_starttls(&self) -> bool {
        self.supports(&Extension::StartTls)
    }

    /// Checks if SIZE is advertised, with or without a limit.
    #[must_use]
    pub fn supports_size(&self) -> bool {
        self.extensions.iter().any(|ext| matches!(ext, Extension::Size(_)))
    }

    /// Returns the maximum message size, if advertised.
    #[must_use]
    pub fn max_message_size(&self) -> Option<usize> {
        self.extensions.iter().find_map(|ext| match ext {
            Extension::Size(size) => *size,
            _ => None,
        })
    }

    /// Returns supported authentication mechanisms.
    #[must_use]
    pub fn auth_mechanisms(&self) -> Vec<AuthMechanism> {
        self.extensions
            .iter()
            .find_map(|ext| match ext {
                Extension::Auth(mechanisms) => Some(mechanisms.clone()),
                _ => None,
            })
            .unwrap_or_default()
    }
}
