//! Future-returning SMTP client.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use courier_smtp::{
    ConnectionOptions, Credentials, Envelope, EventKind, ListenerId, Message, SentMessageInfo,
    SmtpConnection,
};
use parking_lot::Mutex;

use crate::error::{Error, Operation, Result};
use crate::pending::Pending;
use crate::sanitize::sanitize_info;
use crate::transport::Transport;

/// SMTP client whose operations are futures.
///
/// Wraps one [`Transport`] and tracks whether it has reached its terminal
/// state. Once ended, every state-mutating operation fails immediately with
/// [`Error::Ended`] without touching the transport, while [`quit`],
/// [`close`] and [`destroy`] resolve at once.
///
/// Operations are expected to be issued one at a time.
///
/// [`quit`]: SmtpClient::quit
/// [`close`]: SmtpClient::close
/// [`destroy`]: SmtpClient::destroy
///
/// # Example
///
/// ```no_run
/// use courier::{ConnectionOptions, Credentials, Envelope, SmtpClient};
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let options = ConnectionOptions::builder("smtp.example.com").port(587).build()?;
/// let client = SmtpClient::new(options);
/// client.connect().await?;
/// client.login(Credentials::password("user", "pass")).await?;
///
/// let envelope = Envelope::parse("sender@example.com", ["recipient@example.net"])?;
/// let info = client
///     .send(envelope, "Subject: hi\r\n\r\nHello\r\n".into())
///     .await?;
/// println!("{}", info.response);
///
/// client.quit().await;
/// # Ok(())
/// # }
/// ```
pub struct SmtpClient<C: Transport = SmtpConnection> {
    transport: Arc<C>,
    ended: Arc<AtomicBool>,
    secure: AtomicBool,
    end_listener: Mutex<Option<ListenerId>>,
}

impl SmtpClient<SmtpConnection> {
    /// Creates a client over a new, unconnected [`SmtpConnection`].
    #[must_use]
    pub fn new(options: ConnectionOptions) -> Self {
        Self::from_transport(SmtpConnection::new(options))
    }
}

impl<C: Transport> SmtpClient<C> {
    /// Wraps an existing transport.
    pub fn from_transport(transport: C) -> Self {
        Self {
            transport: Arc::new(transport),
            ended: Arc::new(AtomicBool::new(false)),
            secure: AtomicBool::new(false),
            end_listener: Mutex::new(None),
        }
    }

    /// The wrapped transport.
    #[must_use]
    pub fn connection(&self) -> &C {
        &self.transport
    }

    /// True once the connection has reached its terminal state.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// TLS state recorded when `connect` succeeded.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.secure.load(Ordering::Acquire)
    }

    /// Opens the connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] if the connection already ended or ends while
    /// connecting, and [`Error::Smtp`] if establishing the session fails.
    pub async fn connect(&self) -> Result<()> {
        if self.is_ended() {
            return Err(Error::Ended(Operation::Connect));
        }
        self.watch_end();

        self.run(Operation::Connect, identity, |transport, callback| {
            transport.connect(callback);
        })
        .await?;
        self.secure.store(self.transport.is_secure(), Ordering::Release);
        Ok(())
    }

    /// Authenticates.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] after termination and [`Error::Smtp`] with
    /// code `EAUTH` when the server rejects the credentials.
    pub async fn login(&self, credentials: Credentials) -> Result<()> {
        self.run(Operation::Login, identity, move |transport, callback| {
            transport.login(credentials, callback);
        })
        .await
    }

    /// Sends one message.
    ///
    /// The server response and per-recipient errors are sanitized.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] after termination and [`Error::Smtp`] when the
    /// envelope or message is rejected.
    pub async fn send(&self, envelope: Envelope, message: Message) -> Result<SentMessageInfo> {
        self.run(Operation::Send, sanitize_info, move |transport, callback| {
            transport.send(envelope, message, callback);
        })
        .await
    }

    /// Resets the session state.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Ended`] after termination and [`Error::Smtp`] when the
    /// server refuses the reset.
    pub async fn reset(&self) -> Result<()> {
        self.run(Operation::Reset, identity, |transport, callback| {
            transport.reset(callback);
        })
        .await
    }

    /// Ends the session with QUIT and waits until the socket is closed.
    /// Without a live socket the connection is closed instead. Never fails.
    pub async fn quit(&self) {
        self.terminate(C::quit).await;
    }

    /// Drops the connection and waits until the socket is closed. Never
    /// fails.
    pub async fn close(&self) {
        self.terminate(C::close).await;
    }

    /// Closes the connection if needed, marks the client ended and releases
    /// the durable end subscription. Safe to call any number of times.
    pub async fn destroy(&self) {
        if !self.is_ended() {
            self.close().await;
        }
        self.ended.store(true, Ordering::Release);
        if let Some(id) = self.end_listener.lock().take() {
            self.transport.events().remove_listener(id);
        }
        tracing::debug!("Client destroyed");
    }

    /// Installs the durable end subscription, once.
    fn watch_end(&self) {
        let mut listener = self.end_listener.lock();
        if listener.is_none() {
            let ended = Arc::clone(&self.ended);
            *listener = Some(self.transport.events().on(EventKind::End, move |_| {
                ended.store(true, Ordering::Release);
            }));
        }
    }

    async fn run<T: Send + 'static>(
        &self,
        op: Operation,
        finish: fn(T) -> T,
        invoke: impl FnOnce(&C, courier_smtp::Callback<T>),
    ) -> Result<T> {
        if self.is_ended() {
            return Err(Error::Ended(op));
        }

        let (callback, settled) = Pending::start(&self.transport, op, finish);
        invoke(&self.transport, callback);
        let result = settled.await.unwrap_or(Err(Error::Ended(op)));

        match &result {
            Ok(_) => tracing::debug!(%op, "Operation succeeded"),
            Err(err) => tracing::debug!(%op, error = %err, "Operation failed"),
        }
        result
    }

    async fn terminate(&self, teardown: fn(&C)) {
        if self.is_ended() {
            return;
        }

        match self.transport.socket() {
            Some(socket) if socket.is_live() => {
                let closed = socket.closed();
                teardown(&self.transport);
                closed.wait().await;
            }
            // Nothing left to say goodbye to.
            _ => self.transport.close(),
        }
    }
}

impl<C: Transport> std::fmt::Debug for SmtpClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpClient")
            .field("ended", &self.is_ended())
            .field("secure", &self.is_secure())
            .finish_non_exhaustive()
    }
}

const fn identity<T>(value: T) -> T {
    value
}
