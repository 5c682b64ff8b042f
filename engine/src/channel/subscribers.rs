use std::sync::Mutex;

use super::{Inbound, InboundCallback};
use crate::lock;

#[derive(Default)]
struct SubscriberList {
    closed: bool,
    callbacks: Vec<InboundCallback>,
}

/// Ordered callback list shared by the channel implementations.
///
/// Delivery runs with the list locked, so `close()` waits for an in-flight
/// delivery and nothing is delivered once it returns.
#[derive(Default)]
pub(crate) struct Subscribers {
    inner: Mutex<SubscriberList>,
}

impl Subscribers {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&self, callback: InboundCallback) {
        let mut inner = lock(&self.inner);
        if inner.closed {
            tracing::debug!("Ignoring subscription on closed channel");
            return;
        }
        inner.callbacks.push(callback);
    }

    /// Returns `false` if the channel is closed and nothing was delivered.
    pub(crate) fn deliver(&self, inbound: Inbound) -> bool {
        let inner = lock(&self.inner);
        if inner.closed {
            return false;
        }
        for callback in &inner.callbacks {
            callback(inbound.clone());
        }
        true
    }

    /// Returns `true` on the first call only.
    pub(crate) fn close(&self) -> bool {
        let mut inner = lock(&self.inner);
        if inner.closed {
            return false;
        }
        inner.closed = true;
        inner.callbacks.clear();
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.inner).closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn collector() -> (InboundCallback, Arc<Mutex<Vec<Inbound>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let callback: InboundCallback = Arc::new(move |inbound| sink.lock().unwrap().push(inbound));
        (callback, seen)
    }

    #[test]
    fn test_delivers_to_every_callback_in_order() {
        let subscribers = Subscribers::new();
        let (first, first_seen) = collector();
        let (second, second_seen) = collector();
        subscribers.register(first);
        subscribers.register(second);

        subscribers.deliver(Inbound::Line("uciok".into()));
        subscribers.deliver(Inbound::Line("readyok".into()));

        let expected = vec![Inbound::Line("uciok".into()), Inbound::Line("readyok".into())];
        assert_eq!(*first_seen.lock().unwrap(), expected);
        assert_eq!(*second_seen.lock().unwrap(), expected);
    }

    #[test]
    fn test_nothing_after_close() {
        let subscribers = Subscribers::new();
        let (callback, seen) = collector();
        subscribers.register(callback);

        assert!(subscribers.close());
        assert!(!subscribers.close());
        assert!(!subscribers.deliver(Inbound::Line("bestmove e2e4".into())));
        assert!(seen.lock().unwrap().is_empty());
        assert!(subscribers.is_closed());
    }
}
