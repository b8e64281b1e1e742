//! In-process implementation of [`ResultStore`]

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard, PoisonError};

use tracing::{debug, warn};

use super::{Callback, ResultStore, Subscription, SubscriptionId};
use crate::entry::CacheEntry;

struct Inner<V> {
    entries: HashMap<String, CacheEntry<V>>,
    subscribers: HashMap<String, HashMap<SubscriptionId, Callback>>,
}

/// Entries and subscriber sets guarded by one mutex
///
/// Callbacks are snapshotted under the lock and invoked after it is released, so a
/// callback is free to call back into the store.
pub struct MemoryStore<V> {
    inner: Mutex<Inner<V>>,
}

impl<V> MemoryStore<V> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: HashMap::new(),
                subscribers: HashMap::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        // Callbacks never run under this lock
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V> Default for MemoryStore<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> ResultStore<V> for MemoryStore<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn get(&self, key: &str) -> Option<CacheEntry<V>> {
        self.lock().entries.get(key).cloned()
    }

    fn put(&self, key: &str, entry: CacheEntry<V>) {
        debug!(%key, status = %entry.status(), "MemoryStore::put: called");
        self.lock().entries.insert(key.to_string(), entry);
    }

    fn put_if_pending(&self, key: &str, handle_id: u64, entry: CacheEntry<V>) -> bool {
        let mut inner = self.lock();
        match inner.entries.get_mut(key) {
            Some(current) if current.is_pending_for(handle_id) => {
                debug!(%key, handle_id, status = %entry.status(), "MemoryStore::put_if_pending: replaced");
                *current = entry;
                true
            }
            _ => {
                debug!(%key, handle_id, "MemoryStore::put_if_pending: superseded, skipping");
                false
            }
        }
    }

    fn update(&self, key: &str, f: &mut dyn FnMut(Option<&CacheEntry<V>>) -> Option<CacheEntry<V>>) -> bool {
        let mut inner = self.lock();
        match f(inner.entries.get(key)) {
            Some(entry) => {
                debug!(%key, status = %entry.status(), "MemoryStore::update: replaced");
                inner.entries.insert(key.to_string(), entry);
                true
            }
            None => false,
        }
    }

    fn clear(&self, key: &str) {
        debug!(%key, "MemoryStore::clear: called");
        self.lock().entries.remove(key);
    }

    fn clear_if_pending(&self, key: &str, handle_id: u64) -> bool {
        let mut inner = self.lock();
        let matches = inner.entries.get(key).is_some_and(|entry| entry.is_pending_for(handle_id));
        if matches {
            inner.entries.remove(key);
        }
        debug!(%key, handle_id, removed = matches, "MemoryStore::clear_if_pending: called");
        matches
    }

    fn subscribe(&self, key: &str, callback: Callback) -> Subscription {
        let subscription = Subscription::new(key);
        let mut inner = self.lock();
        inner
            .subscribers
            .entry(key.to_string())
            .or_default()
            .insert(subscription.id(), callback);
        debug!(%key, id = ?subscription.id(), "MemoryStore::subscribe: registered");
        subscription
    }

    fn unsubscribe(&self, subscription: &Subscription) {
        let mut inner = self.lock();
        let now_empty = match inner.subscribers.get_mut(subscription.key()) {
            Some(set) => {
                set.remove(&subscription.id());
                set.is_empty()
            }
            None => false,
        };
        if now_empty {
            inner.subscribers.remove(subscription.key());
        }
        debug!(key = %subscription.key(), id = ?subscription.id(), now_empty, "MemoryStore::unsubscribe: removed");
    }

    fn notify(&self, key: &str) {
        let callbacks: Vec<(SubscriptionId, Callback)> = match self.lock().subscribers.get(key) {
            Some(set) => set.iter().map(|(id, cb)| (*id, cb.clone())).collect(),
            None => Vec::new(),
        };
        debug!(%key, count = callbacks.len(), "MemoryStore::notify: called");

        for (id, callback) in callbacks {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                warn!(%key, ?id, "MemoryStore::notify: subscriber panicked, continuing");
            }
        }
    }

    fn subscriber_count(&self, key: &str) -> usize {
        self.lock().subscribers.get(key).map(|set| set.len()).unwrap_or(0)
    }

    fn len(&self) -> usize {
        self.lock().entries.len()
    }

    fn keys(&self) -> Vec<String> {
        self.lock().entries.keys().cloned().collect()
    }
}
