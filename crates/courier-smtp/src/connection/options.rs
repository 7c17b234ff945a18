//! Connection configuration types.

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

use super::stream::{BoxedIo, Io};
use crate::error::{ErrorCode, Result, SmtpError};
use crate::types::AuthMechanism;

const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(2 * 60);
const DEFAULT_GREETING_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Raw TLS settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsOptions {
    /// Reject certificates that fail verification.
    pub reject_unauthorized: bool,
    /// Name used for SNI and certificate verification instead of the host.
    pub servername: Option<String>,
}

impl Default for TlsOptions {
    fn default() -> Self {
        Self {
            reject_unauthorized: true,
            servername: None,
        }
    }
}

/// SMTP connection configuration.
///
/// Built with [`ConnectionOptions::builder`], which validates the combination
/// once.
pub struct ConnectionOptions {
    /// Server hostname or IP address.
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Use TLS from the start (implicit TLS).
    pub secure: bool,
    /// Never issue STARTTLS.
    pub ignore_tls: bool,
    /// Fail unless the session is upgraded with STARTTLS.
    pub require_tls: bool,
    /// Try STARTTLS and continue in plaintext if it is refused.
    pub opportunistic_tls: bool,
    /// Client hostname sent with EHLO/HELO.
    pub name: String,
    /// Local interface to bind to.
    pub local_address: Option<IpAddr>,
    /// Deadline for establishing the TCP (and implicit TLS) connection.
    pub connection_timeout: Duration,
    /// Deadline for the server greeting once connected.
    pub greeting_timeout: Duration,
    /// Allowed inactivity while waiting for a reply.
    pub socket_timeout: Duration,
    /// Log connection lifecycle events.
    pub logger: bool,
    /// Log SMTP commands and replies, without message content.
    pub transaction_log: bool,
    /// Log message content as well.
    pub debug: bool,
    /// Preferred authentication mechanism.
    pub auth_method: Option<AuthMechanism>,
    /// Raw TLS settings.
    pub tls: TlsOptions,
    /// Already connected stream to use instead of dialing `host:port`.
    pub socket: Option<BoxedIo>,
}

impl ConnectionOptions {
    /// Creates a configuration builder.
    #[must_use]
    pub fn builder(host: impl Into<String>) -> ConnectionOptionsBuilder {
        ConnectionOptionsBuilder::new(host)
    }

    /// Name to present to the server during the TLS handshake.
    #[must_use]
    pub fn tls_server_name(&self) -> &str {
        self.tls.servername.as_deref().unwrap_or(&self.host)
    }

    /// True when wire lines should be logged.
    #[must_use]
    pub const fn logs_transactions(&self) -> bool {
        self.transaction_log || self.debug
    }
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        ConnectionOptionsBuilder::new("localhost").into_options()
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .field("ignore_tls", &self.ignore_tls)
            .field("require_tls", &self.require_tls)
            .field("opportunistic_tls", &self.opportunistic_tls)
            .field("name", &self.name)
            .field("local_address", &self.local_address)
            .field("connection_timeout", &self.connection_timeout)
            .field("greeting_timeout", &self.greeting_timeout)
            .field("socket_timeout", &self.socket_timeout)
            .field("auth_method", &self.auth_method)
            .field("tls", &self.tls)
            .field("socket", &self.socket.is_some())
            .finish_non_exhaustive()
    }
}

/// Builder for [`ConnectionOptions`].
pub struct ConnectionOptionsBuilder {
    host: String,
    port: Option<u16>,
    secure: bool,
    ignore_tls: bool,
    require_tls: bool,
    opportunistic_tls: bool,
    name: Option<String>,
    local_address: Option<IpAddr>,
    connection_timeout: Duration,
    greeting_timeout: Duration,
    socket_timeout: Duration,
    logger: bool,
    transaction_log: bool,
    debug: bool,
    auth_method: Option<AuthMechanism>,
    tls: TlsOptions,
    socket: Option<BoxedIo>,
}

impl ConnectionOptionsBuilder {
    /// Creates a new builder with the given hostname.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: None,
            secure: false,
            ignore_tls: false,
            require_tls: false,
            opportunistic_tls: false,
            name: None,
            local_address: None,
            connection_timeout: DEFAULT_CONNECTION_TIMEOUT,
            greeting_timeout: DEFAULT_GREETING_TIMEOUT,
            socket_timeout: DEFAULT_SOCKET_TIMEOUT,
            logger: false,
            transaction_log: false,
            debug: false,
            auth_method: None,
            tls: TlsOptions::default(),
            socket: None,
        }
    }

    /// Sets the port. Defaults to 465 with `secure`, 25 otherwise.
    #[must_use]
    pub const fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Uses implicit TLS.
    #[must_use]
    pub const fn secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    /// Disables STARTTLS.
    #[must_use]
    pub const fn ignore_tls(mut self, ignore: bool) -> Self {
        self.ignore_tls = ignore;
        self
    }

    /// Requires STARTTLS.
    #[must_use]
    pub const fn require_tls(mut self, require: bool) -> Self {
        self.require_tls = require;
        self
    }

    /// Continues in plaintext when STARTTLS fails.
    #[must_use]
    pub const fn opportunistic_tls(mut self, opportunistic: bool) -> Self {
        self.opportunistic_tls = opportunistic;
        self
    }

    /// Sets the client hostname used in EHLO/HELO.
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Binds outgoing connections to a local address.
    #[must_use]
    pub const fn local_address(mut self, address: IpAddr) -> Self {
        self.local_address = Some(address);
        self
    }

    /// Sets the connection timeout.
    #[must_use]
    pub const fn connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout = timeout;
        self
    }

    /// Sets the greeting timeout.
    #[must_use]
    pub const fn greeting_timeout(mut self, timeout: Duration) -> Self {
        self.greeting_timeout = timeout;
        self
    }

    /// Sets the socket inactivity timeout.
    #[must_use]
    pub const fn socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout = timeout;
        self
    }

    /// Enables lifecycle logging.
    #[must_use]
    pub const fn logger(mut self, enabled: bool) -> Self {
        self.logger = enabled;
        self
    }

    /// Enables command/reply logging.
    #[must_use]
    pub const fn transaction_log(mut self, enabled: bool) -> Self {
        self.transaction_log = enabled;
        self
    }

    /// Enables command/reply and message content logging.
    #[must_use]
    pub const fn debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    /// Prefers an authentication mechanism.
    #[must_use]
    pub const fn auth_method(mut self, mechanism: AuthMechanism) -> Self {
        self.auth_method = Some(mechanism);
        self
    }

    /// Sets raw TLS options.
    #[must_use]
    pub fn tls(mut self, tls: TlsOptions) -> Self {
        self.tls = tls;
        self
    }

    /// Uses an already connected stream (e.g. through a proxy).
    #[must_use]
    pub fn socket(mut self, socket: impl Io) -> Self {
        self.socket = Some(Box::new(socket));
        self
    }

    /// Validates and builds the configuration.
    ///
    /// # Errors
    ///
    /// Returns an `ECONNECTION` error for an empty host, a zero timeout, or
    /// `ignore_tls` combined with `require_tls`.
    pub fn build(self) -> Result<ConnectionOptions> {
        let invalid = |reason: &str| Err(SmtpError::new(ErrorCode::Connection, reason.to_string()));

        if self.host.trim().is_empty() && self.socket.is_none() {
            return invalid("host cannot be empty");
        }
        if self.ignore_tls && self.require_tls {
            return invalid("ignore_tls and require_tls are mutually exclusive");
        }
        if [
            self.connection_timeout,
            self.greeting_timeout,
            self.socket_timeout,
        ]
        .contains(&Duration::ZERO)
        {
            return invalid("timeouts must be greater than zero");
        }

        Ok(self.into_options())
    }

    fn into_options(self) -> ConnectionOptions {
        let port = self.port.unwrap_or(if self.secure { 465 } else { 25 });
        let name = self.name.unwrap_or_else(default_name);

        ConnectionOptions {
            host: self.host,
            port,
            secure: self.secure,
            ignore_tls: self.ignore_tls,
            require_tls: self.require_tls,
            opportunistic_tls: self.opportunistic_tls,
            name,
            local_address: self.local_address,
            connection_timeout: self.connection_timeout,
            greeting_timeout: self.greeting_timeout,
            socket_timeout: self.socket_timeout,
            logger: self.logger,
            transaction_log: self.transaction_log,
            debug: self.debug,
            auth_method: self.auth_method,
            tls: self.tls,
            socket: self.socket,
        }
    }
}

impl fmt::Debug for ConnectionOptionsBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptionsBuilder")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

fn default_name() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}
