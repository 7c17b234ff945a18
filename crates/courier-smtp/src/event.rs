//! Connection events and the listener registry.
//!
//! A connection announces `Connect`, `Error` and `End` through an
//! [`EventEmitter`]. Listeners are either persistent ([`EventEmitter::on`]) or
//! one-shot ([`EventEmitter::once`]); both are identified by a [`ListenerId`]
//! that can later be passed to [`EventEmitter::remove_listener`].
//!
//! Listeners run outside the registry lock, so a listener may freely register
//! or remove other listeners. A one-shot listener is taken out of the registry
//! before it is invoked.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::SmtpError;

/// Kind of connection event, used to subscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The session is established and ready for commands.
    Connect,
    /// A fatal error occurred; `End` follows.
    Error,
    /// The connection is permanently terminated.
    End,
}

/// A connection event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The session is established and ready for commands.
    Connect,
    /// A fatal error occurred; `End` follows.
    Error(SmtpError),
    /// The connection is permanently terminated.
    End,
}

impl Event {
    /// Returns the kind of this event.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Connect => EventKind::Connect,
            Self::Error(_) => EventKind::Error,
            Self::End => EventKind::End,
        }
    }
}

/// Handle to a registered listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

enum Handler {
    Persistent(Arc<dyn Fn(&Event) + Send + Sync>),
    Once(Box<dyn FnOnce(&Event) + Send>),
}

impl Handler {
    fn call(self, event: &Event) {
        match self {
            Self::Persistent(f) => f(event),
            Self::Once(f) => f(event),
        }
    }
}

struct Entry {
    id: ListenerId,
    kind: EventKind,
    handler: Handler,
}

/// Registry of event listeners.
#[derive(Default)]
pub struct EventEmitter {
    next_id: AtomicU64,
    listeners: Mutex<Vec<Entry>>,
}

impl EventEmitter {
    /// Creates an emitter with no listeners.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener called on every event of `kind`.
    pub fn on(&self, kind: EventKind, listener: impl Fn(&Event) + Send + Sync + 'static) -> ListenerId {
        self.register(kind, Handler::Persistent(Arc::new(listener)))
    }

    /// Registers a listener called on the next event of `kind` only.
    pub fn once(&self, kind: EventKind, listener: impl FnOnce(&Event) + Send + 'static) -> ListenerId {
        self.register(kind, Handler::Once(Box::new(listener)))
    }

    /// Removes a listener. Returns false if it was not registered (already
    /// fired or already removed).
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        match listeners.iter().position(|entry| entry.id == id) {
            Some(index) => {
                listeners.remove(index);
                true
            }
            None => false,
        }
    }

    /// Number of listeners currently registered for `kind`.
    #[must_use]
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners
            .lock()
            .iter()
            .filter(|entry| entry.kind == kind)
            .count()
    }

    /// Delivers `event` to its listeners in registration order. Returns true
    /// if at least one listener was called.
    pub fn emit(&self, event: &Event) -> bool {
        let kind = event.kind();
        let handlers = {
            let mut listeners = self.listeners.lock();
            let mut handlers = Vec::new();
            let mut index = 0;
            while index < listeners.len() {
                if listeners[index].kind != kind {
                    index += 1;
                    continue;
                }
                if let Handler::Persistent(f) = &listeners[index].handler {
                    handlers.push(Handler::Persistent(Arc::clone(f)));
                    index += 1;
                } else {
                    handlers.push(listeners.remove(index).handler);
                }
            }
            handlers
        };

        let called = !handlers.is_empty();
        for handler in handlers {
            handler.call(event);
        }
        called
    }

    fn register(&self, kind: EventKind, handler: Handler) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push(Entry { id, kind, handler });
        id
    }
}

impl fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEmitter")
            .field("connect", &self.listener_count(EventKind::Connect))
            .field("error", &self.listener_count(EventKind::Error))
            .field("end", &self.listener_count(EventKind::End))
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn persistent_listener_fires_every_time() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        emitter.on(EventKind::End, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(emitter.emit(&Event::End));
        assert!(emitter.emit(&Event::End));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert_eq!(emitter.listener_count(EventKind::End), 1);
    }

    #[test]
    fn once_listener_fires_once_and_is_removed() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        emitter.once(EventKind::End, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        emitter.emit(&Event::End);
        assert!(!emitter.emit(&Event::End));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(emitter.listener_count(EventKind::End), 0);
    }

    #[test]
    fn events_only_reach_their_kind() {
        let emitter = EventEmitter::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        emitter.once(EventKind::Error, move |event| {
            assert!(matches!(event, Event::Error(e) if e.code == ErrorCode::Socket));
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(!emitter.emit(&Event::Connect));
        emitter.emit(&Event::Error(SmtpError::new(ErrorCode::Socket, "reset")));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_listener_reports_presence() {
        let emitter = EventEmitter::new();
        let id = emitter.once(EventKind::End, |_| {});
        assert!(emitter.remove_listener(id));
        assert!(!emitter.remove_listener(id));
        assert!(!emitter.emit(&Event::End));
    }

    #[test]
    fn listener_may_remove_another_during_emit() {
        let emitter = Arc::new(EventEmitter::new());
        let error_id = emitter.once(EventKind::Error, |_| {});
        let inner = Arc::clone(&emitter);
        emitter.once(EventKind::End, move |_| {
            assert!(inner.remove_listener(error_id));
        });

        emitter.emit(&Event::End);
        assert_eq!(emitter.listener_count(EventKind::Error), 0);
        assert_eq!(emitter.listener_count(EventKind::End), 0);
    }

    #[test]
    fn listeners_run_in_registration_order() {
        let emitter = EventEmitter::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        for n in 0..3 {
            let order = Arc::clone(&order);
            emitter.once(EventKind::Connect, move |_| order.lock().push(n));
        }
        emitter.emit(&Event::Connect);
        assert_eq!(*order.lock(), vec![0, 1, 2]);
    }
}
