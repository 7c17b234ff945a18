//! Error types for SMTP operations.

use std::fmt;
use std::io;

use crate::types::Reply;

/// Result type alias for SMTP operations.
pub type Result<T> = std::result::Result<T, SmtpError>;

/// Category of an SMTP failure.
///
/// The string forms (`ECONNECTION`, `EAUTH`, ...) are stable and suitable for
/// matching in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Connection could not be established or configuration is invalid.
    Connection,
    /// A connection, greeting or socket deadline elapsed.
    Timeout,
    /// Socket-level I/O failure.
    Socket,
    /// Server sent something the client did not expect.
    Protocol,
    /// TLS upgrade or handshake failed.
    Tls,
    /// Authentication was rejected.
    Auth,
    /// Sender or recipients were rejected.
    Envelope,
    /// Message data was rejected.
    Message,
    /// Reading the message source failed.
    Streaming,
}

impl ErrorCode {
    /// Returns the code as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "ECONNECTION",
            Self::Timeout => "ETIMEDOUT",
            Self::Socket => "ESOCKET",
            Self::Protocol => "EPROTOCOL",
            Self::Tls => "ETLS",
            Self::Auth => "EAUTH",
            Self::Envelope => "EENVELOPE",
            Self::Message => "EMESSAGE",
            Self::Streaming => "ESTREAMING",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured SMTP error.
///
/// Cloneable because a single failure can be delivered to several event
/// listeners.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct SmtpError {
    /// Failure category.
    pub code: ErrorCode,
    /// Human readable description.
    pub message: String,
    /// Last response received from the server, if the failure was caused by one.
    pub response: Option<String>,
    /// Numeric code of `response`.
    pub response_code: Option<u16>,
    /// Command that triggered the failure.
    pub command: Option<String>,
}

impl SmtpError {
    /// Creates an error without server response.
    #[must_use]
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            response: None,
            response_code: None,
            command: None,
        }
    }

    /// Creates an error from a negative server reply.
    #[must_use]
    pub fn from_reply(code: ErrorCode, message: impl Into<String>, reply: &Reply) -> Self {
        let response = reply.to_string();
        Self {
            code,
            message: format!("{}: {response}", message.into()),
            response: Some(response),
            response_code: Some(reply.code.as_u16()),
            command: None,
        }
    }

    /// Attaches the command that triggered the error.
    #[must_use]
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Returns true if this is a permanent error (5xx).
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        matches!(self.response_code, Some(code) if code >= 500 && code < 600)
    }

    /// Returns true if this is a transient error (4xx).
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self.response_code, Some(code) if code >= 400 && code < 500)
    }
}

impl From<io::Error> for SmtpError {
    fn from(err: io::Error) -> Self {
        let code = match err.kind() {
            io::ErrorKind::TimedOut => ErrorCode::Timeout,
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::AddrNotAvailable
            | io::ErrorKind::NotFound => ErrorCode::Connection,
            _ => ErrorCode::Socket,
        };
        Self::new(code, err.to_string())
    }
}

impl From<rustls::Error> for SmtpError {
    fn from(err: rustls::Error) -> Self {
        Self::new(ErrorCode::Tls, err.to_string())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::redundant_clone)]
mod tests {
    use super::*;
    use crate::types::ReplyCode;

    #[test]
    fn code_strings() {
        assert_eq!(ErrorCode::Auth.as_str(), "EAUTH");
        assert_eq!(ErrorCode::Timeout.to_string(), "ETIMEDOUT");
        assert_eq!(ErrorCode::Envelope.as_str(), "EENVELOPE");
    }

    #[test]
    fn from_reply_keeps_response() {
        let reply = Reply::new(
            ReplyCode::AUTH_FAILED,
            vec!["Authentication failed".to_string()],
        );
        let err = SmtpError::from_reply(ErrorCode::Auth, "Invalid login", &reply);
        assert_eq!(err.response.as_deref(), Some("535 Authentication failed"));
        assert_eq!(err.response_code, Some(535));
        assert_eq!(err.message, "Invalid login: 535 Authentication failed");
        assert!(err.is_permanent());
        assert!(!err.is_transient());
    }

    #[test]
    fn transient_classification() {
        let reply = Reply::new(ReplyCode::MAILBOX_BUSY, vec!["Try later".to_string()]);
        let err = SmtpError::from_reply(ErrorCode::Envelope, "Recipient deferred", &reply);
        assert!(err.is_transient());
    }

    #[test]
    fn io_timeout_maps_to_timeout() {
        let err = SmtpError::from(io::Error::new(io::ErrorKind::TimedOut, "slow"));
        assert_eq!(err.code, ErrorCode::Timeout);
        assert!(err.response.is_none());
    }

    #[test]
    fn display_is_message() {
        let err = SmtpError::new(ErrorCode::Socket, "broken pipe").with_command("DATA");
        assert_eq!(err.to_string(), "broken pipe");
        assert_eq!(err.command.as_deref(), Some("DATA"));
    }
}
