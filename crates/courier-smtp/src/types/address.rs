//! Envelope address type.

use std::fmt;
use std::str::FromStr;

use crate::error::{ErrorCode, Result, SmtpError};

/// Email address used in `MAIL FROM` and `RCPT TO`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Address(String);

impl Address {
    /// Creates a new address from a string.
    ///
    /// # Errors
    ///
    /// Returns an `EENVELOPE` error if the address is invalid.
    pub fn new(addr: impl Into<String>) -> Result<Self> {
        let addr = addr.into();
        Self::validate(&addr)?;
        Ok(Self(addr))
    }

    /// Returns the address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Basic syntactic validation; the server has the final word.
    fn validate(addr: &str) -> Result<()> {
        let invalid = |reason: &str| {
            Err(SmtpError::new(
                ErrorCode::Envelope,
                format!("Invalid address {addr:?}: {reason}"),
            ))
        };

        if addr.is_empty() {
            return invalid("address cannot be empty");
        }
        if addr.bytes().any(|b| b.is_ascii_control() || b == b' ' || b == b'<' || b == b'>') {
            return invalid("address contains forbidden characters");
        }

        let Some((local, domain)) = addr.split_once('@') else {
            return invalid("address must contain @");
        };
        if domain.contains('@') {
            return invalid("address must have exactly one @");
        }
        if local.is_empty() || domain.is_empty() {
            return invalid("local and domain parts cannot be empty");
        }

        Ok(())
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = SmtpError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<&str> for Address {
    type Error = SmtpError;

    fn try_from(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for Address {
    type Error = SmtpError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(s)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn valid_address() {
        let addr = Address::new("user@example.com").unwrap();
        assert_eq!(addr.as_str(), "user@example.com");
        assert_eq!(addr.to_string(), "user@example.com");
    }

    #[test]
    fn parse_via_from_str() {
        let addr: Address = "recipient@example.net".parse().unwrap();
        assert_eq!(addr.as_str(), "recipient@example.net");
    }

    #[test]
    fn rejects_missing_at() {
        let err = Address::new("userexample.com").unwrap_err();
        assert_eq!(err.code, ErrorCode::Envelope);
    }

    #[test]
    fn rejects_empty_parts() {
        assert!(Address::new("").is_err());
        assert!(Address::new("@example.com").is_err());
        assert!(Address::new("user@").is_err());
    }

    #[test]
    fn rejects_two_ats() {
        assert!(Address::new("a@b@example.com").is_err());
    }

    #[test]
    fn rejects_command_injection() {
        assert!(Address::new("user@example.com>\r\nRCPT TO:<x@y").is_err());
        assert!(Address::new("user name@example.com").is_err());
    }
}
