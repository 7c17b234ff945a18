//! Message payload and delivery result.

use std::fmt;
use std::io::Cursor;
use std::pin::Pin;

use bytes::Bytes;
use tokio::io::AsyncRead;

use crate::error::SmtpError;

/// RFC 5322 message handed to `DATA`.
///
/// Line endings are normalized to CRLF and leading dots are stuffed while
/// the message is transmitted, so either form can be supplied.
pub enum Message {
    /// Message held in memory.
    Bytes(Bytes),
    /// Message read from a stream while it is sent.
    Stream(Pin<Box<dyn AsyncRead + Send>>),
}

impl Message {
    /// Wraps a reader; it is consumed during `DATA`.
    pub fn from_reader(reader: impl AsyncRead + Send + 'static) -> Self {
        Self::Stream(Box::pin(reader))
    }

    pub(crate) fn into_reader(self) -> Pin<Box<dyn AsyncRead + Send>> {
        match self {
            Self::Bytes(bytes) => Box::pin(Cursor::new(bytes)),
            Self::Stream(reader) => reader,
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Self::Stream(_) => f.write_str("Stream"),
        }
    }
}

impl From<Bytes> for Message {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for Message {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for Message {
    fn from(text: String) -> Self {
        Self::Bytes(Bytes::from(text))
    }
}

impl From<&'static str> for Message {
    fn from(text: &'static str) -> Self {
        Self::Bytes(Bytes::from_static(text.as_bytes()))
    }
}

/// Outcome of a successful `send`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SentMessageInfo {
    /// Recipients accepted by the server.
    pub accepted: Vec<String>,
    /// Recipients rejected by the server.
    pub rejected: Vec<String>,
    /// One error per rejected recipient, in the same order as `rejected`.
    pub rejected_errors: Vec<SmtpError>,
    /// Last response received from the server.
    pub response: String,
}
