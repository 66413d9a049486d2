use crate::collection::{CollectionChange, ObservableList};
use crate::node::{Node, NodeId};
use crate::notify::SubscriptionId;
use crate::scheduler::CoalescingScheduler;
use crossbeam_channel::Receiver;
use dashmap::DashMap;
use rayon::ThreadPool;
use std::cmp::{Ordering, Reverse};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Sort key for the biggest-first order: known sizes descending, then
/// unknown sizes, which compare equal to each other.
pub fn size_key(size: Option<u64>) -> (bool, Reverse<u64>) {
    (size.is_none(), Reverse(size.unwrap_or(0)))
}

/// Comparator form of [`size_key`].
pub fn compare_sizes(a: Option<u64>, b: Option<u64>) -> Ordering {
    size_key(a).cmp(&size_key(b))
}

struct Inner {
    list: ObservableList<Arc<Node>>,
    subscriptions: DashMap<NodeId, SubscriptionId>,
    resort: CoalescingScheduler,
    owner: Weak<Node>,
}

pub struct ChildSet {
    inner: Arc<Inner>,
}

impl ChildSet {
    pub(crate) fn new(owner: Weak<Node>, pool: Arc<ThreadPool>) -> Self {
        Self {
            inner: Arc::new(Inner {
                list: ObservableList::new(),
                subscriptions: DashMap::new(),
                resort: CoalescingScheduler::new(pool),
                owner,
            }),
        }
    }

    /// Insert `child` at its sorted position and subscribe to its size.
    ///
    /// The owning directory is asked to recompute, so a child added after the
    /// directory's size was final reopens the aggregate.
    pub fn add(&self, child: Arc<Node>) -> usize {
        let set = Arc::downgrade(&self.inner);
        let subscription = child.subscribe_size(move |_| {
            if let Some(set) = set.upgrade() {
                set.child_changed();
            }
        });
        if let Some(stale) = self.inner.subscriptions.insert(child.id(), subscription) {
            child.unsubscribe_size(stale);
        }

        let key = size_key(child.size());
        let index = self.inner.list.insert_with(child, |items, _| {
            items.partition_point(|existing| size_key(existing.size()) <= key)
        });
        self.inner.child_changed();
        index
    }

    /// Remove `child` and drop its size subscription. Returns false if absent.
    pub fn remove(&self, child: &Arc<Node>) -> bool {
        if let Some((_, subscription)) = self.inner.subscriptions.remove(&child.id()) {
            child.unsubscribe_size(subscription);
        }
        let removed = self
            .inner
            .list
            .remove_first(|existing| Arc::ptr_eq(existing, child))
            .is_some();
        if removed {
            self.inner.notify_owner();
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.inner.list.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.list.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Arc<Node>> {
        self.inner.list.get(index)
    }

    pub fn snapshot(&self) -> Vec<Arc<Node>> {
        self.inner.list.snapshot()
    }

    pub fn contains(&self, child: &Arc<Node>) -> bool {
        self.inner
            .list
            .position(|existing| Arc::ptr_eq(existing, child))
            .is_some()
    }

    /// The underlying list, for subscriptions and locked reads.
    pub fn list(&self) -> &ObservableList<Arc<Node>> {
        &self.inner.list
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<CollectionChange<Arc<Node>>>) {
        self.inner.list.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.inner.list.unsubscribe(id)
    }

    /// Number of children this set is subscribed to.
    pub fn subscription_count(&self) -> usize {
        self.inner.subscriptions.len()
    }

    /// Queue a resort with the current sizes and wait for the scheduler to
    /// drain. Returns false on timeout.
    pub fn wait_sorted(&self, timeout: Duration) -> bool {
        self.inner.request_resort();
        self.inner.resort.wait_idle(timeout)
    }

    /// Resorts actually executed so far.
    pub fn resort_count(&self) -> u64 {
        self.inner.resort.executed()
    }
}

impl Inner {
    fn child_changed(self: &Arc<Self>) {
        self.request_resort();
        self.notify_owner();
    }

    fn notify_owner(&self) {
        if let Some(owner) = self.owner.upgrade() {
            owner.request_recompute();
        }
    }

    fn request_resort(self: &Arc<Self>) {
        let set = Arc::downgrade(self);
        self.resort.submit(move || {
            if let Some(set) = set.upgrade() {
                set.list.sort_by_cached_key(|child| size_key(child.size()));
            }
        });
    }
}
