use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;

use courier::{
    Callback, Credentials, Envelope, Event, EventEmitter, EventKind, Message, SentMessageInfo,
    SmtpError, SocketHandle, Transport,
};

/// Transport double whose callbacks and signals are fired by the test.
///
/// `quit` and `close` end the connection synchronously: `End` first, then
/// the socket's closed signal.
#[derive(Default)]
pub struct ScriptedTransport {
    events: EventEmitter,
    calls: Mutex<Vec<&'static str>>,
    unit: Mutex<Option<Callback<()>>>,
    sent: Mutex<Option<Callback<SentMessageInfo>>>,
    socket: Mutex<Option<SocketHandle>>,
    ended: AtomicBool,
    secure: AtomicBool,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reports TLS after connect.
    pub fn secured() -> Self {
        let transport = Self::default();
        transport.secure.store(true, Ordering::SeqCst);
        transport
    }

    /// Names of the transport methods invoked so far.
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    /// `(End, Error)` listener counts.
    pub fn listeners(&self) -> (usize, usize) {
        (
            self.events.listener_count(EventKind::End),
            self.events.listener_count(EventKind::Error),
        )
    }

    /// Completes the outstanding connect/login/reset. Returns false if none
    /// is outstanding.
    pub fn complete(&self, result: Result<(), SmtpError>) -> bool {
        let callback = self.unit.lock().take();
        callback.map(|callback| callback(result)).is_some()
    }

    /// Completes the outstanding send.
    pub fn complete_send(&self, result: Result<SentMessageInfo, SmtpError>) -> bool {
        let callback = self.sent.lock().take();
        callback.map(|callback| callback(result)).is_some()
    }

    /// Drops every outstanding callback without calling it.
    pub fn drop_callbacks(&self) {
        drop(self.unit.lock().take());
        drop(self.sent.lock().take());
    }

    /// Emits `Error` without ending.
    pub fn error(&self, err: SmtpError) {
        self.events.emit(&Event::Error(err));
    }

    /// Emits `Error`, then ends.
    pub fn fail(&self, err: SmtpError) {
        self.error(err);
        self.end();
    }

    /// Emits `End` once and closes the socket.
    pub fn end(&self) {
        if !self.ended.swap(true, Ordering::SeqCst) {
            self.events.emit(&Event::End);
        }
        if let Some(socket) = self.socket.lock().as_ref() {
            socket.mark_closed();
        }
    }

    /// Replaces the socket with one that is already closed.
    pub fn kill_socket(&self) {
        let socket = SocketHandle::new();
        socket.mark_closed();
        *self.socket.lock() = Some(socket);
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().push(call);
    }
}

impl Transport for ScriptedTransport {
    fn events(&self) -> &EventEmitter {
        &self.events
    }

    fn connect(&self, callback: Callback<()>) {
        self.record("connect");
        self.socket.lock().get_or_insert_with(SocketHandle::new);
        *self.unit.lock() = Some(callback);
    }

    fn login(&self, _credentials: Credentials, callback: Callback<()>) {
        self.record("login");
        *self.unit.lock() = Some(callback);
    }

    fn send(&self, _envelope: Envelope, _message: Message, callback: Callback<SentMessageInfo>) {
        self.record("send");
        *self.sent.lock() = Some(callback);
    }

    fn reset(&self, callback: Callback<()>) {
        self.record("reset");
        *self.unit.lock() = Some(callback);
    }

    fn quit(&self) {
        self.record("quit");
        self.end();
    }

    fn close(&self) {
        self.record("close");
        self.end();
    }

    fn is_secure(&self) -> bool {
        self.secure.load(Ordering::SeqCst)
    }

    fn socket(&self) -> Option<SocketHandle> {
        self.socket.lock().clone()
    }
}
