//! The callback-style connection contract the adapter drives.

use courier_smtp::{
    Callback, Credentials, Envelope, EventEmitter, Message, SentMessageInfo, SmtpConnection,
    SocketHandle,
};

/// Event-driven SMTP connection.
///
/// Operations return at once and report through their callback, which is
/// invoked at most once. A fatal failure is announced as `Error` followed by
/// `End` on [`Transport::events`] and may leave the callback uncalled.
pub trait Transport: Send + Sync + 'static {
    /// Listener registry for `Connect`, `Error` and `End`.
    fn events(&self) -> &EventEmitter;

    /// Opens the connection.
    fn connect(&self, callback: Callback<()>);

    /// Authenticates.
    fn login(&self, credentials: Credentials, callback: Callback<()>);

    /// Runs one mail transaction.
    fn send(&self, envelope: Envelope, message: Message, callback: Callback<SentMessageInfo>);

    /// Resets the session state.
    fn reset(&self, callback: Callback<()>);

    /// Ends the session gracefully; fire-and-forget.
    fn quit(&self);

    /// Drops the connection; fire-and-forget.
    fn close(&self);

    /// True once the session runs over TLS.
    fn is_secure(&self) -> bool;

    /// Transport socket, if one has been opened.
    fn socket(&self) -> Option<SocketHandle>;
}

impl Transport for SmtpConnection {
    fn events(&self) -> &EventEmitter {
        Self::events(self)
    }

    fn connect(&self, callback: Callback<()>) {
        Self::connect(self, callback);
    }

    fn login(&self, credentials: Credentials, callback: Callback<()>) {
        Self::login(self, credentials, callback);
    }

    fn send(&self, envelope: Envelope, message: Message, callback: Callback<SentMessageInfo>) {
        Self::send(self, envelope, message, callback);
    }

    fn reset(&self, callback: Callback<()>) {
        Self::reset(self, callback);
    }

    fn quit(&self) {
        Self::quit(self);
    }

    fn close(&self) {
        Self::close(self);
    }

    fn is_secure(&self) -> bool {
        Self::is_secure(self)
    }

    fn socket(&self) -> Option<SocketHandle> {
        Self::socket(self)
    }
}
