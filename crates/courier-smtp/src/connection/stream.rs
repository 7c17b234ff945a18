//! Low-level SMTP stream handling.

use std::fmt;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::{TcpSocket, TcpStream};
use tokio_rustls::TlsConnector;
use tokio_rustls::client::TlsStream;

use super::tls;
use crate::error::{ErrorCode, Result, SmtpError};

/// Byte stream an SMTP session can run over.
pub trait Io: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + Sync + 'static> Io for T {}

/// Type-erased transport stream.
pub type BoxedIo = Box<dyn Io>;

/// SMTP stream (plain or TLS).
pub enum SmtpStream {
    /// Unencrypted connection.
    Plain(BufReader<BoxedIo>),
    /// TLS-encrypted connection.
    Tls(Box<BufReader<TlsStream<BoxedIo>>>),
}

impl SmtpStream {
    /// Wraps a connected stream without encryption.
    #[must_use]
    pub fn plain(io: BoxedIo) -> Self {
        Self::Plain(BufReader::new(io))
    }

    /// Performs a TLS handshake over a connected stream.
    ///
    /// # Errors
    ///
    /// Returns an `ETLS` error if the handshake fails.
    pub async fn tls(io: BoxedIo, connector: &TlsConnector, server_name: &str) -> Result<Self> {
        let name = tls::server_name(server_name)?;
        let stream = connector
            .connect(name, io)
            .await
            .map_err(|err| SmtpError::new(ErrorCode::Tls, err.to_string()))?;
        Ok(Self::Tls(Box::new(BufReader::new(stream))))
    }

    /// Upgrades a plain stream to TLS (after `STARTTLS`).
    ///
    /// # Errors
    ///
    /// Returns an error if the stream is already encrypted or the handshake
    /// fails.
    pub async fn upgrade(self, connector: &TlsConnector, server_name: &str) -> Result<Self> {
        match self {
            // Bytes buffered before the handshake would be plaintext injected by
            // the peer, so they are dropped with the reader.
            Self::Plain(reader) => Self::tls(reader.into_inner(), connector, server_name).await,
            Self::Tls(_) => Err(SmtpError::new(
                ErrorCode::Protocol,
                "Connection is already using TLS",
            )),
        }
    }

    /// Returns true if the stream is encrypted.
    #[must_use]
    pub const fn is_tls(&self) -> bool {
        matches!(self, Self::Tls(_))
    }

    /// Reads one line, without the trailing CRLF.
    ///
    /// # Errors
    ///
    /// Returns `ETIMEDOUT` if nothing arrives within `timeout` and `ESOCKET`
    /// if the peer closed the connection.
    pub async fn read_line(&mut self, timeout: Duration) -> Result<String> {
        let mut buf = Vec::new();
        let read = match self {
            Self::Plain(reader) => tokio::time::timeout(timeout, reader.read_until(b'\n', &mut buf)).await,
            Self::Tls(reader) => tokio::time::timeout(timeout, reader.read_until(b'\n', &mut buf)).await,
        };

        let n = read.map_err(|_| SmtpError::new(ErrorCode::Timeout, "Timeout"))??;
        if n == 0 {
            return Err(SmtpError::new(
                ErrorCode::Socket,
                "Connection closed unexpectedly",
            ));
        }

        let line = String::from_utf8_lossy(&buf);
        Ok(line.trim_end_matches(['\r', '\n']).to_string())
    }

    /// Writes data and flushes it.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.write_chunk(data).await?;
        self.flush().await
    }

    /// Writes data without flushing.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub async fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        match self {
            Self::Plain(reader) => reader.get_mut().write_all(data).await?,
            Self::Tls(reader) => reader.get_mut().write_all(data).await?,
        }
        Ok(())
    }

    /// Flushes buffered writes.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush fails.
    pub async fn flush(&mut self) -> Result<()> {
        match self {
            Self::Plain(reader) => reader.get_mut().flush().await?,
            Self::Tls(reader) => reader.get_mut().flush().await?,
        }
        Ok(())
    }

    /// Shuts the write half down. Errors are ignored; the peer may already be
    /// gone.
    pub async fn shutdown(&mut self) {
        let _ = match self {
            Self::Plain(reader) => reader.get_mut().shutdown().await,
            Self::Tls(reader) => reader.get_mut().shutdown().await,
        };
    }
}

impl fmt::Debug for SmtpStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(_) => f.write_str("SmtpStream::Plain"),
            Self::Tls(_) => f.write_str("SmtpStream::Tls"),
        }
    }
}

/// Opens a TCP connection to `host:port`, optionally from `local_address`.
///
/// Every resolved address is tried in turn; the whole attempt is bounded by
/// `timeout`.
///
/// # Errors
///
/// Returns `ETIMEDOUT` when the deadline elapses and `ECONNECTION` when no
/// address accepts the connection.
pub async fn dial(
    host: &str,
    port: u16,
    local_address: Option<IpAddr>,
    timeout: Duration,
) -> Result<BoxedIo> {
    match tokio::time::timeout(timeout, connect_any(host, port, local_address)).await {
        Ok(Ok(stream)) => {
            let _ = stream.set_nodelay(true);
            Ok(Box::new(stream))
        }
        Ok(Err(err)) => Err(SmtpError::new(ErrorCode::Connection, err.to_string())),
        Err(_) => Err(SmtpError::new(ErrorCode::Timeout, "Connection timeout")),
    }
}

async fn connect_any(host: &str, port: u16, local_address: Option<IpAddr>) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in tokio::net::lookup_host((host, port)).await? {
        match connect_addr(addr, local_address).await {
            Ok(stream) => return Ok(stream),
            Err(err) => last_err = Some(err),
        }
    }
    Err(last_err.unwrap_or_else(|| {
        io::Error::new(io::ErrorKind::NotFound, format!("No address found for {host}"))
    }))
}

async fn connect_addr(addr: SocketAddr, local_address: Option<IpAddr>) -> io::Result<TcpStream> {
    let socket = if addr.is_ipv4() {
        TcpSocket::new_v4()?
    } else {
        TcpSocket::new_v6()?
    };
    if let Some(local) = local_address {
        socket.bind(SocketAddr::new(local, 0))?;
    }
    socket.connect(addr).await
}
