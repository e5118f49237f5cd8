use std::sync::Arc;

use parking_lot::Mutex;

type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriberId(u64);

/// Typed publish/subscribe channel owned by a store.
///
/// Handlers run synchronously inside `emit`, in subscription order. The
/// subscriber list is snapshotted before dispatch and no lock is held while a
/// handler runs, so handlers may emit, subscribe or unsubscribe freely.
/// Cloning yields another handle to the same bus.
pub struct EventBus<E> {
    inner: Arc<Mutex<BusInner<E>>>,
}

struct BusInner<E> {
    next_id: u64,
    emitted: u64,
    subscribers: Vec<(SubscriberId, Handler<E>)>,
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner {
                next_id: 0,
                emitted: 0,
                subscribers: Vec::new(),
            })),
        }
    }

    pub fn subscribe(&self, handler: impl Fn(&E) + Send + Sync + 'static) -> SubscriberId {
        let mut inner = self.inner.lock();
        let id = SubscriberId(inner.next_id);
        inner.next_id = inner.next_id.wrapping_add(1);
        inner.subscribers.push((id, Arc::new(handler)));
        id
    }

    /// Returns `true` if the subscriber was registered.
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.subscribers.len();
        inner.subscribers.retain(|(sid, _)| *sid != id);
        inner.subscribers.len() != before
    }

    pub fn emit(&self, event: &E) {
        let handlers: Vec<Handler<E>> = {
            let mut inner = self.inner.lock();
            inner.emitted += 1;
            inner.subscribers.iter().map(|(_, h)| h.clone()).collect()
        };
        for handler in handlers {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }

    /// Number of events emitted so far.
    pub fn emitted(&self) -> u64 {
        self.inner.lock().emitted
    }
}

impl<E> Clone for EventBus<E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("EventBus")
            .field("subscribers", &inner.subscribers.len())
            .field("emitted", &inner.emitted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::EventBus;

    #[test]
    fn delivers_in_subscription_order() {
        let bus: EventBus<&'static str> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let s = seen.clone();
        bus.subscribe(move |e| s.lock().push(format!("a:{e}")));
        let s = seen.clone();
        bus.subscribe(move |e| s.lock().push(format!("b:{e}")));

        bus.emit(&"x");
        assert_eq!(*seen.lock(), vec!["a:x", "b:x"]);
        assert_eq!(bus.emitted(), 1);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let bus: EventBus<u32> = EventBus::new();
        let count = Arc::new(Mutex::new(0u32));
        let c = count.clone();
        let id = bus.subscribe(move |v| *c.lock() += v);

        bus.emit(&2);
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&5);
        assert_eq!(*count.lock(), 2);
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn handlers_may_reenter_the_bus() {
        let bus: EventBus<u32> = EventBus::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let inner_bus = bus.clone();
        let s = seen.clone();
        bus.subscribe(move |v| {
            s.lock().push(*v);
            if *v == 1 {
                inner_bus.emit(&2);
            }
        });

        bus.emit(&1);
        assert_eq!(*seen.lock(), vec![1, 2]);
    }
}
