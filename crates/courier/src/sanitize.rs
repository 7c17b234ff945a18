//! Printable-ASCII sanitization of server supplied text.
//!
//! SMTP servers may answer with arbitrary bytes. Text crossing the adapter
//! boundary has every byte outside `0x20..=0x7E` replaced by `?`, so it is
//! safe to log or display.

use courier_smtp::{SentMessageInfo, SmtpError};

/// Replacement for non-printable bytes.
pub const PLACEHOLDER: char = '?';

/// Replaces every byte outside printable ASCII with [`PLACEHOLDER`].
///
/// Works on the UTF-8 encoding, so a multi-byte character becomes one
/// placeholder per byte.
#[must_use]
pub fn printable_ascii(text: &str) -> String {
    text.bytes()
        .map(|b| if (0x20..=0x7e).contains(&b) { char::from(b) } else { PLACEHOLDER })
        .collect()
}

/// Sanitizes the message and, when present, the response of an error.
#[must_use]
pub fn sanitize_error(mut err: SmtpError) -> SmtpError {
    err.message = printable_ascii(&err.message);
    if let Some(response) = err.response.as_deref() {
        err.response = Some(printable_ascii(response));
    }
    err
}

/// Sanitizes the response and the per-recipient errors of a delivery result.
#[must_use]
pub fn sanitize_info(mut info: SentMessageInfo) -> SentMessageInfo {
    info.response = printable_ascii(&info.response);
    info.rejected_errors = info.rejected_errors.into_iter().map(sanitize_error).collect();
    info
}
