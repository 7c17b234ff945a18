//! SMTP reply parser.
//!
//! Sans-I/O: lines are fed in one at a time and a [`Reply`] comes out once the
//! final line of a (possibly multi-line) reply has been seen.

use crate::error::{ErrorCode, Result, SmtpError};
use crate::types::{Reply, ReplyCode};

/// Accumulates reply lines until the reply is complete.
///
/// SMTP replies can be single-line or multi-line:
/// - Single: `250 OK\r\n`
/// - Multi: `250-First line\r\n250-Second line\r\n250 Last line\r\n`
#[derive(Debug, Default)]
pub struct ReplyParser {
    code: Option<ReplyCode>,
    message: Vec<String>,
}

impl ReplyParser {
    /// Creates an empty parser.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            code: None,
            message: Vec::new(),
        }
    }

    /// Feeds one line (without CRLF). Returns the reply once it is complete.
    ///
    /// # Errors
    ///
    /// Returns a protocol error for a malformed line or a code that changes
    /// in the middle of a multi-line reply.
    pub fn feed(&mut self, line: &str) -> Result<Option<Reply>> {
        let (code, last, text) = split_line(line)?;

        match self.code {
            Some(prev) if prev != code => {
                return Err(protocol(format!(
                    "Reply code changed from {prev} to {code} within one reply"
                )));
            }
            _ => self.code = Some(code),
        }
        self.message.push(text.to_string());

        if last {
            self.code = None;
            Ok(Some(Reply::new(code, std::mem::take(&mut self.message))))
        } else {
            Ok(None)
        }
    }
}

/// Parses a complete reply from its lines.
///
/// # Errors
///
/// Returns an error if the reply is empty, malformed, or not terminated.
pub fn parse_reply(lines: &[String]) -> Result<Reply> {
    let mut parser = ReplyParser::new();
    for line in lines {
        if let Some(reply) = parser.feed(line)? {
            return Ok(reply);
        }
    }
    Err(protocol("Incomplete reply".to_string()))
}

fn split_line(line: &str) -> Result<(ReplyCode, bool, &str)> {
    let bytes = line.as_bytes();
    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(protocol(format!("Invalid reply line: {line}")));
    }

    let code = line[..3]
        .parse::<u16>()
        .map_err(|_| protocol(format!("Invalid reply code: {}", &line[..3])))?;

    match bytes.get(3) {
        None => Ok((ReplyCode::new(code), true, "")),
        Some(b' ') => Ok((ReplyCode::new(code), true, &line[4..])),
        Some(b'-') => Ok((ReplyCode::new(code), false, &line[4..])),
        Some(_) => Err(protocol(format!("Malformed reply line: {line}"))),
    }
}

fn protocol(message: String) -> SmtpError {
    SmtpError::new(ErrorCode::Protocol, message)
}
