use crossbeam_channel::{unbounded, Receiver};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

pub type Handler<E> = Arc<dyn Fn(&E) + Send + Sync>;

pub struct Observers<E> {
    handlers: DashMap<SubscriptionId, Handler<E>>,
    next_id: AtomicU64,
}

impl<E> Default for Observers<E> {
    fn default() -> Self {
        Self {
            handlers: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<E> Observers<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers.insert(id, Arc::new(handler));
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.handlers.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Deliver `event` to every subscriber.
    ///
    /// Handlers are collected first and invoked with no shard lock held, so a
    /// handler may subscribe or unsubscribe on this registry.
    pub fn emit(&self, event: &E) {
        let mut handlers: Vec<(SubscriptionId, Handler<E>)> = self
            .handlers
            .iter()
            .map(|entry| (*entry.key(), Arc::clone(entry.value())))
            .collect();
        handlers.sort_by_key(|(id, _)| *id);

        for (_, handler) in handlers {
            handler(event);
        }
    }
}

impl<E: Clone + Send + 'static> Observers<E> {
    /// Subscribe with a channel instead of a callback.
    ///
    /// The subscription stays registered until unsubscribed; events sent after
    /// the receiver is dropped are discarded.
    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<E>) {
        let (tx, rx) = unbounded();
        let id = self.subscribe(move |event: &E| {
            let _ = tx.send(event.clone());
        });
        (id, rx)
    }
}
