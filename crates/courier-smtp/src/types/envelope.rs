//! SMTP envelope: sender, recipients and transaction parameters.

use std::fmt::Write;

use super::Address;
use crate::error::{ErrorCode, Result, SmtpError};

/// SMTP-level addressing for one message, distinct from the message headers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Reverse path. `None` sends the null sender `<>`.
    pub from: Option<Address>,
    /// Forward paths, one `RCPT TO` each.
    pub to: Vec<Address>,
    /// Predicted message size, announced when the server supports SIZE.
    pub size: Option<usize>,
    /// Announce 8-bit content when the server supports 8BITMIME.
    pub use_8bit_mime: bool,
    /// Delivery status notification request.
    pub dsn: Option<DsnOptions>,
}

impl Envelope {
    /// Creates an envelope with a sender and recipients.
    #[must_use]
    pub fn new(from: Address, to: impl IntoIterator<Item = Address>) -> Self {
        Self {
            from: Some(from),
            to: to.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Parses sender and recipients from strings.
    ///
    /// # Errors
    ///
    /// Returns an `EENVELOPE` error if any address is invalid.
    pub fn parse<'a>(from: &str, to: impl IntoIterator<Item = &'a str>) -> Result<Self> {
        let to = to.into_iter().map(Address::new).collect::<Result<Vec<_>>>()?;
        Ok(Self::new(Address::new(from)?, to))
    }

    /// Sets the predicted message size.
    #[must_use]
    pub const fn with_size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    /// Marks the message as containing 8-bit data.
    #[must_use]
    pub const fn with_8bit_mime(mut self) -> Self {
        self.use_8bit_mime = true;
        self
    }

    /// Requests delivery status notifications.
    #[must_use]
    pub fn with_dsn(mut self, dsn: DsnOptions) -> Self {
        self.dsn = Some(dsn);
        self
    }

    /// Checks the envelope before any command is sent.
    ///
    /// # Errors
    ///
    /// Returns an `EENVELOPE` error when there are no recipients or the DSN
    /// notify list combines `NEVER` with other conditions.
    pub fn validate(&self) -> Result<()> {
        if self.to.is_empty() {
            return Err(SmtpError::new(ErrorCode::Envelope, "No recipients defined"));
        }
        if let Some(dsn) = &self.dsn {
            dsn.validate()?;
        }
        Ok(())
    }

    /// Returns the reverse path as it appears between the angle brackets.
    #[must_use]
    pub fn reverse_path(&self) -> &str {
        self.from.as_ref().map_or("", Address::as_str)
    }
}

/// `RET` parameter of a DSN request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsnReturn {
    /// Return the full message.
    Full,
    /// Return headers only.
    Headers,
}

impl DsnReturn {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Headers => "HDRS",
        }
    }
}

/// `NOTIFY` condition of a DSN request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DsnNotify {
    /// Never send a notification. Must appear alone.
    Never,
    /// Notify on successful delivery.
    Success,
    /// Notify on failure.
    Failure,
    /// Notify on delay.
    Delay,
}

impl DsnNotify {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Never => "NEVER",
            Self::Success => "SUCCESS",
            Self::Failure => "FAILURE",
            Self::Delay => "DELAY",
        }
    }
}

/// Delivery status notification options (RFC 3461).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DsnOptions {
    /// Whether to return the full message or only headers.
    pub ret: Option<DsnReturn>,
    /// Sender's envelope identifier for tracking.
    pub envid: Option<String>,
    /// When to send a notification.
    pub notify: Vec<DsnNotify>,
    /// Original recipient.
    pub orcpt: Option<String>,
}

impl DsnOptions {
    fn validate(&self) -> Result<()> {
        if self.notify.contains(&DsnNotify::Never) && self.notify.len() > 1 {
            return Err(SmtpError::new(
                ErrorCode::Envelope,
                "DSN NOTIFY=NEVER cannot be combined with other conditions",
            ));
        }
        Ok(())
    }

    /// ESMTP parameters for `MAIL FROM`.
    #[must_use]
    pub fn mail_params(&self) -> Vec<String> {
        let mut params = Vec::new();
        if let Some(ret) = self.ret {
            params.push(format!("RET={}", ret.as_str()));
        }
        if let Some(envid) = &self.envid {
            params.push(format!("ENVID={}", encode_xtext(envid)));
        }
        params
    }

    /// ESMTP parameters for `RCPT TO`.
    #[must_use]
    pub fn rcpt_params(&self) -> Vec<String> {
        let mut params = Vec::new();
        if !self.notify.is_empty() {
            let notify: Vec<&str> = self.notify.iter().map(|n| n.as_str()).collect();
            params.push(format!("NOTIFY={}", notify.join(",")));
        }
        if let Some(orcpt) = &self.orcpt {
            params.push(format!("ORCPT=rfc822;{}", encode_xtext(orcpt)));
        }
        params
    }
}

/// Encodes a value as RFC 3461 xtext.
#[must_use]
pub fn encode_xtext(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for b in value.bytes() {
        if (33..=126).contains(&b) && b != b'+' && b != b'=' {
            out.push(char::from(b));
        } else {
            let _ = write!(out, "+{b:02X}");
        }
    }
    out
}
