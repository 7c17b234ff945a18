//! SMTP command builder.

use crate::types::{Address, AuthMechanism};

/// SMTP command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// HELO - Simple greeting
    Helo {
        /// Client hostname
        hostname: String,
    },
    /// EHLO - Extended greeting
    Ehlo {
        /// Client hostname
        hostname: String,
    },
    /// STARTTLS - Upgrade to TLS
    StartTls,
    /// AUTH - Begin authentication
    Auth {
        /// Authentication mechanism
        mechanism: AuthMechanism,
        /// Initial response (optional, for SASL-IR)
        initial_response: Option<String>,
    },
    /// Base64 answer to a 334 challenge
    AuthResponse(String),
    /// MAIL FROM - Start mail transaction
    MailFrom {
        /// Sender address, `None` for the null sender
        from: Option<Address>,
        /// ESMTP parameters (`SIZE=`, `BODY=`, `RET=`, ...)
        params: Vec<String>,
    },
    /// RCPT TO - Add recipient
    RcptTo {
        /// Recipient address
        to: Address,
        /// ESMTP parameters (`NOTIFY=`, `ORCPT=`)
        params: Vec<String>,
    },
    /// DATA - Begin message data
    Data,
    /// RSET - Reset transaction
    Rset,
    /// QUIT - Close connection
    Quit,
}

impl Command {
    /// Serializes the command to bytes.
    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        let mut line = self.to_line(false);
        line.push_str("\r\n");
        line.into_bytes()
    }

    /// Command verb, used to label errors.
    #[must_use]
    pub const fn verb(&self) -> &'static str {
        match self {
            Self::Helo { .. } => "HELO",
            Self::Ehlo { .. } => "EHLO",
            Self::StartTls => "STARTTLS",
            Self::Auth { .. } | Self::AuthResponse(_) => "AUTH",
            Self::MailFrom { .. } => "MAIL FROM",
            Self::RcptTo { .. } => "RCPT TO",
            Self::Data => "DATA",
            Self::Rset => "RSET",
            Self::Quit => "QUIT",
        }
    }

    /// Command line safe for logging: SASL payloads are masked.
    #[must_use]
    pub fn redacted(&self) -> String {
        self.to_line(true)
    }

    fn to_line(&self, redact: bool) -> String {
        let secret = |value: &str| {
            if redact {
                "/* secret */".to_string()
            } else {
                value.to_string()
            }
        };

        match self {
            Self::Helo { hostname } => format!("HELO {hostname}"),
            Self::Ehlo { hostname } => format!("EHLO {hostname}"),
            Self::StartTls => "STARTTLS".to_string(),
            Self::Auth {
                mechanism,
                initial_response: Some(resp),
            } => format!("AUTH {mechanism} {}", secret(resp)),
            Self::Auth {
                mechanism,
                initial_response: None,
            } => format!("AUTH {mechanism}"),
            Self::AuthResponse(resp) => secret(resp),
            Self::MailFrom { from, params } => {
                let path = from.as_ref().map_or("", Address::as_str);
                with_params(format!("MAIL FROM:<{path}>"), params)
            }
            Self::RcptTo { to, params } => with_params(format!("RCPT TO:<{to}>"), params),
            Self::Data => "DATA".to_string(),
            Self::Rset => "RSET".to_string(),
            Self::Quit => "QUIT".to_string(),
        }
    }
}

fn with_params(mut line: String, params: &[String]) -> String {
    for param in params {
        line.push(' ');
        line.push_str(param);
    }
    line
}
