//! Liveness and "closed" signal of the transport socket.

use std::sync::Arc;

use tokio::sync::watch;

/// Shared view of one transport socket.
///
/// Clones observe the same socket. Once closed, a socket never becomes live
/// again.
#[derive(Debug, Clone)]
pub struct SocketHandle {
    closed: Arc<watch::Sender<bool>>,
}

impl SocketHandle {
    /// Creates a live socket handle.
    #[must_use]
    pub fn new() -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            closed: Arc::new(closed),
        }
    }

    /// Returns true until the socket has been closed.
    #[must_use]
    pub fn is_live(&self) -> bool {
        !*self.closed.borrow()
    }

    /// Subscribes to the closed signal.
    ///
    /// The subscription observes a close that happens after this call even
    /// if it is awaited later.
    #[must_use]
    pub fn closed(&self) -> ClosedSignal {
        ClosedSignal(self.closed.subscribe())
    }

    /// Marks the socket closed and wakes every subscriber. Returns false if
    /// it was already closed.
    pub fn mark_closed(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }
}

impl Default for SocketHandle {
    fn default() -> Self {
        Self::new()
    }
}

/// Pending subscription to a socket's closed signal.
#[derive(Debug)]
pub struct ClosedSignal(watch::Receiver<bool>);

impl ClosedSignal {
    /// Resolves once the socket is closed.
    pub async fn wait(mut self) {
        // A dropped sender means every handle is gone, which is closed too.
        let _closed = self.0.wait_for(|closed| *closed).await.is_ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn starts_live() {
        let socket = SocketHandle::new();
        assert!(socket.is_live());
        assert!(socket.mark_closed());
        assert!(!socket.is_live());
        assert!(!socket.mark_closed());
    }

    #[tokio::test]
    async fn signal_observes_later_close() {
        let socket = SocketHandle::new();
        let signal = socket.closed();
        let closer = socket.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            closer.mark_closed();
        });
        tokio::time::timeout(Duration::from_secs(1), signal.wait())
            .await
            .unwrap_or_else(|_| panic!("closed signal never fired"));
    }

    #[tokio::test]
    async fn signal_after_close_resolves_immediately() {
        let socket = SocketHandle::new();
        socket.mark_closed();
        let mut wait = tokio_test::task::spawn(socket.closed().wait());
        tokio_test::assert_ready!(wait.poll());
    }
}
