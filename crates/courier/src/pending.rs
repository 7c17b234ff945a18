//! One in-flight operation and the listeners it temporarily owns.
//!
//! Three signals race to settle an operation: its own completion callback,
//! the connection's `End` and the connection's `Error`. Whichever comes first
//! removes both temporary listeners and then settles the operation; the
//! others find it settled and do nothing.

use std::sync::{Arc, Weak};

use courier_smtp::{Callback, Event, EventKind, ListenerId};
use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::error::{Error, Operation, Result};
use crate::sanitize::sanitize_error;
use crate::transport::Transport;

pub(crate) struct Pending<T> {
    op: Operation,
    slot: Mutex<Option<oneshot::Sender<Result<T>>>>,
    listeners: Mutex<Option<[ListenerId; 2]>>,
}

impl<T: Send + 'static> Pending<T> {
    /// Attaches the temporary `End` and `Error` listeners and returns the
    /// completion callback to hand to the transport together with the
    /// receiving end of the settlement.
    ///
    /// `finish` post-processes a successful result.
    pub(crate) fn start<C: Transport>(
        transport: &Arc<C>,
        op: Operation,
        finish: fn(T) -> T,
    ) -> (Callback<T>, oneshot::Receiver<Result<T>>) {
        let (tx, rx) = oneshot::channel();
        let pending = Arc::new(Self {
            op,
            slot: Mutex::new(Some(tx)),
            listeners: Mutex::new(None),
        });

        {
            // Held across both registrations: a signal racing with this block
            // waits here instead of seeing only one of the two listeners.
            let mut listeners = pending.listeners.lock();
            let events = transport.events();

            let on_end = {
                let pending = Arc::clone(&pending);
                let transport = Arc::downgrade(transport);
                events.once(EventKind::End, move |_| {
                    pending.detach(&transport);
                    pending.settle(Err(Error::Ended(op)));
                })
            };
            let on_error = {
                let pending = Arc::clone(&pending);
                let transport = Arc::downgrade(transport);
                events.once(EventKind::Error, move |event| {
                    pending.detach(&transport);
                    let err = match event {
                        Event::Error(err) => Error::Smtp(sanitize_error(err.clone())),
                        _ => Error::Ended(op),
                    };
                    pending.settle(Err(err));
                })
            };

            *listeners = Some([on_end, on_error]);
        }

        let completion = Completion {
            pending,
            transport: Arc::downgrade(transport),
            finish,
        };
        (Box::new(move |result| completion.complete(result)), rx)
    }

    /// Removes both temporary listeners. Only the first call does anything.
    fn detach<C: Transport>(&self, transport: &Weak<C>) {
        let ids = self.listeners.lock().take();
        if let (Some(ids), Some(transport)) = (ids, transport.upgrade()) {
            for id in ids {
                transport.events().remove_listener(id);
            }
        }
    }

    /// Settles the operation. Returns false if it was already settled.
    fn settle(&self, result: Result<T>) -> bool {
        match self.slot.lock().take() {
            Some(tx) => {
                // The caller may have stopped waiting; nothing to clean up then.
                let _ = tx.send(result);
                true
            }
            None => false,
        }
    }
}

/// Completion side handed to the transport.
///
/// A transport that drops the callback without calling it settles the
/// operation as ended, so the caller is never left waiting.
struct Completion<T: Send + 'static, C: Transport> {
    pending: Arc<Pending<T>>,
    transport: Weak<C>,
    finish: fn(T) -> T,
}

impl<T: Send + 'static, C: Transport> Completion<T, C> {
    fn complete(self, result: courier_smtp::Result<T>) {
        self.pending.detach(&self.transport);
        self.pending.settle(
            result
                .map(self.finish)
                .map_err(|err| Error::Smtp(sanitize_error(err))),
        );
    }
}

impl<T: Send + 'static, C: Transport> Drop for Completion<T, C> {
    fn drop(&mut self) {
        self.pending.detach(&self.transport);
        self.pending.settle(Err(Error::Ended(self.pending.op)));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use courier_smtp::{
        Credentials, Envelope, ErrorCode, EventEmitter, Message, SentMessageInfo, SmtpError,
        SocketHandle,
    };

    use super::*;

    /// Transport whose callbacks are driven by the test.
    #[derive(Default)]
    struct Bare {
        events: EventEmitter,
    }

    impl Transport for Bare {
        fn events(&self) -> &EventEmitter {
            &self.events
        }
        fn connect(&self, _callback: Callback<()>) {}
        fn login(&self, _credentials: Credentials, _callback: Callback<()>) {}
        fn send(&self, _envelope: Envelope, _message: Message, _callback: Callback<SentMessageInfo>) {}
        fn reset(&self, _callback: Callback<()>) {}
        fn quit(&self) {}
        fn close(&self) {}
        fn is_secure(&self) -> bool {
            false
        }
        fn socket(&self) -> Option<SocketHandle> {
            None
        }
    }

    fn identity<T>(value: T) -> T {
        value
    }

    fn listeners(transport: &Bare) -> usize {
        transport.events.listener_count(EventKind::End) + transport.events.listener_count(EventKind::Error)
    }

    #[tokio::test]
    async fn callback_settles_and_detaches() {
        let transport = Arc::new(Bare::default());
        let (callback, rx) = Pending::<()>::start(&transport, Operation::Reset, identity);
        assert_eq!(listeners(&transport), 2);

        callback(Ok(()));
        assert_eq!(listeners(&transport), 0);
        assert_eq!(rx.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn end_settles_as_ended() {
        let transport = Arc::new(Bare::default());
        let (callback, rx) = Pending::<()>::start(&transport, Operation::Login, identity);

        transport.events.emit(&Event::End);
        assert_eq!(listeners(&transport), 0);
        // A late callback changes nothing.
        callback(Ok(()));
        assert_eq!(rx.await.unwrap(), Err(Error::Ended(Operation::Login)));
    }

    #[tokio::test]
    async fn error_settles_with_sanitized_error() {
        let transport = Arc::new(Bare::default());
        let (_callback, rx) = Pending::<()>::start(&transport, Operation::Send, identity);

        transport
            .events
            .emit(&Event::Error(SmtpError::new(ErrorCode::Socket, "reset\r\n")));
        transport.events.emit(&Event::End);
        assert_eq!(listeners(&transport), 0);

        let err = rx.await.unwrap().unwrap_err();
        assert_eq!(err.code(), Some(ErrorCode::Socket));
        assert_eq!(err.to_string(), "reset??");
    }

    #[tokio::test]
    async fn dropped_callback_settles_as_ended() {
        let transport = Arc::new(Bare::default());
        let (callback, rx) = Pending::<()>::start(&transport, Operation::Connect, identity);

        drop(callback);
        assert_eq!(listeners(&transport), 0);
        assert_eq!(rx.await.unwrap(), Err(Error::Ended(Operation::Connect)));
    }

    #[tokio::test]
    async fn finish_applies_to_success_only() {
        let transport = Arc::new(Bare::default());
        let (callback, rx) = Pending::<u32>::start(&transport, Operation::Send, |n| n + 1);
        callback(Ok(41));
        assert_eq!(rx.await.unwrap(), Ok(42));
    }
}
