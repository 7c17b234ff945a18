//! Callback-style SMTP connection.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::task::AbortHandle;

use super::ServerInfo;
use super::options::ConnectionOptions;
use super::session::Session;
use super::stream::BoxedIo;
use crate::error::{ErrorCode, Result, SmtpError};
use crate::event::{Event, EventEmitter};
use crate::socket::SocketHandle;
use crate::types::{Credentials, Envelope, Message, SentMessageInfo};

/// Completion callback of a connection operation.
///
/// Invoked at most once. It is never invoked when the operation ends in a
/// fatal failure; that failure is delivered as [`Event::Error`] instead.
pub type Callback<T> = Box<dyn FnOnce(Result<T>) + Send>;

type OpFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

static NEXT_CID: AtomicU64 = AtomicU64::new(1);

/// Event-driven SMTP connection.
///
/// Every operation returns immediately and completes on a background task,
/// so a Tokio runtime must be running. Operations are serialized: a second
/// operation waits until the first has finished with the session.
///
/// Clones share the same connection.
#[derive(Clone)]
pub struct SmtpConnection {
    inner: Arc<Inner>,
}

struct Inner {
    cid: u64,
    options: Arc<ConnectionOptions>,
    preconnected: Mutex<Option<BoxedIo>>,
    events: EventEmitter,
    socket: Mutex<Option<SocketHandle>>,
    session: tokio::sync::Mutex<Option<Session>>,
    server: Mutex<Option<ServerInfo>>,
    started: AtomicBool,
    secure: AtomicBool,
    ended: AtomicBool,
    tasks: Mutex<Vec<AbortHandle>>,
}

impl SmtpConnection {
    /// Creates an unconnected connection.
    #[must_use]
    pub fn new(mut options: ConnectionOptions) -> Self {
        let preconnected = options.socket.take();
        Self {
            inner: Arc::new(Inner {
                cid: NEXT_CID.fetch_add(1, Ordering::Relaxed),
                options: Arc::new(options),
                preconnected: Mutex::new(preconnected),
                events: EventEmitter::new(),
                socket: Mutex::new(None),
                session: tokio::sync::Mutex::new(None),
                server: Mutex::new(None),
                started: AtomicBool::new(false),
                secure: AtomicBool::new(false),
                ended: AtomicBool::new(false),
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Connection id used in log records.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.inner.cid
    }

    /// Listener registry for `Connect`, `Error` and `End`.
    #[must_use]
    pub fn events(&self) -> &EventEmitter {
        &self.inner.events
    }

    /// Transport socket, present once `connect` has been called.
    #[must_use]
    pub fn socket(&self) -> Option<SocketHandle> {
        self.inner.socket.lock().clone()
    }

    /// True once the session runs over TLS.
    #[must_use]
    pub fn is_secure(&self) -> bool {
        self.inner.secure.load(Ordering::Acquire)
    }

    /// Server capabilities, known once connected.
    #[must_use]
    pub fn server_info(&self) -> Option<ServerInfo> {
        self.inner.server.lock().clone()
    }

    /// Opens the connection and runs the greeting and TLS negotiation.
    ///
    /// On success `Connect` is emitted, then the callback runs. Any failure
    /// is fatal.
    pub fn connect(&self, callback: Callback<()>) {
        if self.inner.ended.load(Ordering::Acquire) {
            callback(Err(SmtpError::new(
                ErrorCode::Connection,
                "Connection is already closed",
            )));
            return;
        }
        if self.inner.started.swap(true, Ordering::AcqRel) {
            callback(Err(SmtpError::new(
                ErrorCode::Connection,
                "Connection has already been started",
            )));
            return;
        }

        *self.inner.socket.lock() = Some(SocketHandle::new());
        let inner = Arc::clone(&self.inner);
        if inner.options.logger {
            tracing::debug!(
                cid = inner.cid,
                host = %inner.options.host,
                port = inner.options.port,
                secure = inner.options.secure,
                "Connecting"
            );
        }

        self.spawn(async move {
            let socket = inner.preconnected.lock().take();
            match Session::establish(inner.cid, Arc::clone(&inner.options), socket).await {
                Ok(session) => {
                    inner.secure.store(session.is_secure(), Ordering::Release);
                    *inner.server.lock() = Some(session.server().clone());
                    *inner.session.lock().await = Some(session);
                    if inner.options.logger {
                        tracing::debug!(cid = inner.cid, "Connection established");
                    }
                    inner.events.emit(&Event::Connect);
                    callback(Ok(()));
                }
                Err(err) => inner.fail(err),
            }
        });
    }

    /// Authenticates with the given credentials.
    pub fn login(&self, credentials: Credentials, callback: Callback<()>) {
        self.run(callback, move |session| Box::pin(session.authenticate(credentials)));
    }

    /// Sends one message. Rejected recipients are reported in the result as
    /// long as at least one recipient was accepted.
    pub fn send(&self, envelope: Envelope, message: Message, callback: Callback<SentMessageInfo>) {
        self.run(callback, move |session| Box::pin(session.send(envelope, message)));
    }

    /// Resets the session state with RSET.
    pub fn reset(&self, callback: Callback<()>) {
        self.run(callback, |session| Box::pin(session.reset()));
    }

    /// Sends QUIT once the session is idle, then closes the connection.
    ///
    /// On a connection that already ended this only makes sure the socket
    /// is marked closed.
    pub fn quit(&self) {
        if self.inner.ended.load(Ordering::Acquire) {
            self.inner.close();
            return;
        }
        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            let session = inner.session.lock().await.take();
            if let Some(mut session) = session {
                session.quit().await;
            }
            inner.close();
        });
    }

    /// Closes the connection immediately, abandoning in-flight operations.
    ///
    /// `End` is emitted once, however often this is called.
    pub fn close(&self) {
        self.inner.close();
    }

    fn run<T, F>(&self, callback: Callback<T>, op: F)
    where
        T: Send + 'static,
        F: for<'a> FnOnce(&'a mut Session) -> OpFuture<'a, T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        self.spawn(async move {
            let result = {
                let mut session = inner.session.lock().await;
                match session.as_mut() {
                    Some(session) => op(session).await,
                    None => Err(SmtpError::new(
                        ErrorCode::Connection,
                        "Connection is not established",
                    )),
                }
            };
            match result {
                Err(err) if is_fatal(&err) => inner.fail(err),
                result => callback(result),
            }
        });
    }

    fn spawn(&self, task: impl Future<Output = ()> + Send + 'static) {
        let handle = tokio::spawn(task).abort_handle();
        let mut tasks = self.inner.tasks.lock();
        tasks.retain(|task| !task.is_finished());
        tasks.push(handle);
    }
}

impl std::fmt::Debug for SmtpConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpConnection")
            .field("cid", &self.inner.cid)
            .field("host", &self.inner.options.host)
            .field("port", &self.inner.options.port)
            .field("secure", &self.is_secure())
            .field("ended", &self.inner.ended.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl Inner {
    /// Reports a fatal failure and tears the connection down.
    fn fail(self: &Arc<Self>, err: SmtpError) {
        tracing::warn!(cid = self.cid, code = %err.code, error = %err, "Connection failed");
        self.events.emit(&Event::Error(err));
        self.close();
    }

    fn close(self: &Arc<Self>) {
        for task in self.tasks.lock().drain(..) {
            task.abort();
        }

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            match self.session.try_lock() {
                Ok(mut guard) => {
                    if let Some(mut session) = guard.take() {
                        runtime.spawn(async move { session.shutdown().await });
                    }
                }
                Err(_) => {
                    // Still held by a task that was just aborted.
                    let inner = Arc::clone(self);
                    runtime.spawn(async move {
                        let session = inner.session.lock().await.take();
                        if let Some(mut session) = session {
                            session.shutdown().await;
                        }
                    });
                }
            }
        }

        if !self.ended.swap(true, Ordering::AcqRel) {
            if self.options.logger {
                tracing::debug!(cid = self.cid, "Connection closed");
            }
            self.events.emit(&Event::End);
        }
        if let Some(socket) = self.socket.lock().as_ref() {
            socket.mark_closed();
        }
    }
}

/// Failures that leave the session unusable. Rejections carry a server
/// response and keep the session open.
const fn is_fatal(err: &SmtpError) -> bool {
    err.response.is_none()
        && matches!(
            err.code,
            ErrorCode::Timeout
                | ErrorCode::Socket
                | ErrorCode::Protocol
                | ErrorCode::Tls
                | ErrorCode::Streaming
        )
}
