use crate::cancel::CancelToken;
use crate::error::{Result, TreeError};
use crate::notify::{Observers, SubscriptionId};
use crossbeam_channel::Receiver;
use parking_lot::Mutex;

/// A single mutation of an [`ObservableList`].
///
/// `Reset` means the list changed wholesale: discard any cached view and
/// re-read it in full.
#[derive(Debug, Clone, PartialEq)]
pub enum CollectionChange<T> {
    Added { item: T, index: usize },
    Removed { item: T, index: usize },
    Replaced { item: T, index: usize },
    Reset,
}

pub struct ObservableList<T> {
    items: Mutex<Vec<T>>,
    observers: Observers<CollectionChange<T>>,
}

impl<T: Clone + Send + Sync + 'static> Default for ObservableList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + Send + Sync + 'static> ObservableList<T> {
    pub fn new() -> Self {
        Self {
            items: Mutex::new(Vec::new()),
            observers: Observers::new(),
        }
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        Self {
            items: Mutex::new(items),
            observers: Observers::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.items.lock().get(index).cloned()
    }

    /// Copy of the current contents; later mutations do not affect it.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.lock().clone()
    }

    /// Run `f` over the contents with the lock held.
    pub fn with_items<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        f(self.items.lock().as_slice())
    }

    pub fn position(&self, pred: impl FnMut(&T) -> bool) -> Option<usize> {
        self.items.lock().iter().position(pred)
    }

    /// Append and return the index the item landed at.
    pub fn push(&self, item: T) -> usize {
        let mut items = self.items.lock();
        let index = items.len();
        items.push(item.clone());
        self.observers.emit(&CollectionChange::Added { item, index });
        index
    }

    pub fn insert(&self, index: usize, item: T) -> Result<()> {
        let mut items = self.items.lock();
        if index > items.len() {
            return Err(TreeError::IndexOutOfBounds {
                index,
                len: items.len(),
            });
        }
        items.insert(index, item.clone());
        self.observers.emit(&CollectionChange::Added { item, index });
        Ok(())
    }

    /// Insert at the index `locate` computes from the contents, under one lock.
    pub fn insert_with(&self, item: T, locate: impl FnOnce(&[T], &T) -> usize) -> usize {
        let mut items = self.items.lock();
        let index = locate(items.as_slice(), &item).min(items.len());
        items.insert(index, item.clone());
        self.observers.emit(&CollectionChange::Added { item, index });
        index
    }

    /// Append a batch and emit a single `Reset`.
    ///
    /// Stops early once `cancel` is set; whatever was appended stays.
    /// Returns the number of items appended.
    pub fn add_range<I>(&self, batch: I, cancel: Option<&CancelToken>) -> usize
    where
        I: IntoIterator<Item = T>,
    {
        let mut items = self.items.lock();
        let mut added = 0;
        for item in batch {
            if cancel.is_some_and(CancelToken::is_cancelled) {
                break;
            }
            items.push(item);
            added += 1;
        }
        if added > 0 {
            self.observers.emit(&CollectionChange::Reset);
        }
        added
    }

    pub fn remove_first(&self, pred: impl FnMut(&T) -> bool) -> Option<T> {
        let mut items = self.items.lock();
        let index = items.iter().position(pred)?;
        let item = items.remove(index);
        self.observers.emit(&CollectionChange::Removed {
            item: item.clone(),
            index,
        });
        Some(item)
    }

    pub fn remove_at(&self, index: usize) -> Result<T> {
        let mut items = self.items.lock();
        if index >= items.len() {
            return Err(TreeError::IndexOutOfBounds {
                index,
                len: items.len(),
            });
        }
        let item = items.remove(index);
        self.observers.emit(&CollectionChange::Removed {
            item: item.clone(),
            index,
        });
        Ok(item)
    }

    /// Replace the item at `index`, returning the previous one.
    pub fn replace(&self, index: usize, item: T) -> Result<T> {
        let mut items = self.items.lock();
        let len = items.len();
        let slot = items
            .get_mut(index)
            .ok_or(TreeError::IndexOutOfBounds { index, len })?;
        let previous = std::mem::replace(slot, item.clone());
        self.observers
            .emit(&CollectionChange::Replaced { item, index });
        Ok(previous)
    }

    pub fn clear(&self) {
        let mut items = self.items.lock();
        items.clear();
        self.observers.emit(&CollectionChange::Reset);
    }

    /// Stable sort by a comparator. Emits `Reset` only if the order changed.
    ///
    /// The comparator must be consistent for the duration of the sort; when
    /// the ordering depends on values other threads mutate, use
    /// [`ObservableList::sort_by_cached_key`].
    pub fn sort_by(&self, mut compare: impl FnMut(&T, &T) -> std::cmp::Ordering) -> bool {
        let mut items = self.items.lock();
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by(|&a, &b| compare(&items[a], &items[b]));
        self.apply_order(&mut items, order)
    }

    /// Stable sort on keys read once per item before sorting.
    pub fn sort_by_cached_key<K: Ord>(&self, mut key: impl FnMut(&T) -> K) -> bool {
        let mut items = self.items.lock();
        let keys: Vec<K> = items.iter().map(&mut key).collect();
        let mut order: Vec<usize> = (0..items.len()).collect();
        order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
        self.apply_order(&mut items, order)
    }

    fn apply_order(&self, items: &mut Vec<T>, order: Vec<usize>) -> bool {
        if order.iter().enumerate().all(|(position, &index)| position == index) {
            return false;
        }
        let reordered: Vec<T> = order.iter().map(|&index| items[index].clone()).collect();
        *items = reordered;
        self.observers.emit(&CollectionChange::Reset);
        true
    }

    /// Register a handler. It runs with the list lock held.
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&CollectionChange<T>) + Send + Sync + 'static,
    {
        self.observers.subscribe(handler)
    }

    pub fn subscribe_channel(&self) -> (SubscriptionId, Receiver<CollectionChange<T>>) {
        self.observers.subscribe_channel()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.unsubscribe(id)
    }

    pub fn subscriber_count(&self) -> usize {
        self.observers.len()
    }
}

impl<T: Clone + PartialEq + Send + Sync + 'static> ObservableList<T> {
    pub fn contains(&self, item: &T) -> bool {
        self.items.lock().contains(item)
    }

    pub fn index_of(&self, item: &T) -> Option<usize> {
        self.items.lock().iter().position(|candidate| candidate == item)
    }

    /// Remove the first element equal to `item`. Returns false if absent.
    pub fn remove(&self, item: &T) -> bool {
        self.remove_first(|candidate| candidate == item).is_some()
    }
}
