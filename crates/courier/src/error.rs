//! Error types of the adapter.

use std::fmt;

use courier_smtp::{ErrorCode, SmtpError};

/// Result type alias for adapter operations.
pub type Result<T> = std::result::Result<T, Error>;

/// State-mutating operation, named in "already ended" errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `connect`
    Connect,
    /// `login`
    Login,
    /// `send`
    Send,
    /// `reset`
    Reset,
}

impl Operation {
    /// Returns the operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Login => "login",
            Self::Send => "send",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Adapter error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// The connection reached its terminal state before or while the
    /// operation ran.
    #[error("Cannot {0} - SMTP connection is already ended.")]
    Ended(Operation),

    /// The connection reported a failure. Text fields are sanitized.
    #[error(transparent)]
    Smtp(#[from] SmtpError),
}

impl Error {
    /// Returns true for the "already ended" condition.
    #[must_use]
    pub const fn is_ended(&self) -> bool {
        matches!(self, Self::Ended(_))
    }

    /// Returns the SMTP error code, if the failure came from the connection.
    #[must_use]
    pub const fn code(&self) -> Option<ErrorCode> {
        match self {
            Self::Ended(_) => None,
            Self::Smtp(err) => Some(err.code),
        }
    }

    /// Returns the underlying SMTP error, if any.
    #[must_use]
    pub const fn as_smtp(&self) -> Option<&SmtpError> {
        match self {
            Self::Ended(_) => None,
            Self::Smtp(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ended_messages() {
        assert_eq!(
            Error::Ended(Operation::Connect).to_string(),
            "Cannot connect - SMTP connection is already ended."
        );
        assert_eq!(
            Error::Ended(Operation::Send).to_string(),
            "Cannot send - SMTP connection is already ended."
        );
    }

    #[test]
    fn smtp_errors_are_transparent() {
        let err = Error::from(SmtpError::new(ErrorCode::Auth, "Invalid login"));
        assert_eq!(err.to_string(), "Invalid login");
        assert_eq!(err.code(), Some(ErrorCode::Auth));
        assert!(!err.is_ended());
        assert!(Error::Ended(Operation::Reset).as_smtp().is_none());
    }
}
