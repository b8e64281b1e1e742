//! Shared Result Store - keyed fetch results plus per-key change notification
//!
//! The store is the single source of truth for keyed asynchronous results. Every
//! consumer that shares a cache key reads and writes the same [`CacheEntry`], and
//! registers a callback to hear about changes to it.
//!
//! # Architecture
//!
//! ```text
//!   consumer A ──start_fetch──┐                 ┌──▶ on_store_change (A)
//!                             ▼                 │
//!                    ┌─────────────────┐  notify(key)
//!                    │   ResultStore   │────────┼──▶ on_store_change (B)
//!                    │ key → CacheEntry│        │
//!                    │ key → callbacks │        └──▶ on_store_change (C)
//!                    └─────────────────┘
//! ```
//!
//! Entries never expire. Callers that need eviction call [`ResultStore::clear`].
//!
//! Access always goes through the [`ResultStore`] trait so a scoped or per-tenant
//! store can replace the process-wide [`MemoryStore`] returned by [`global`].

mod memory;
mod registry;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::entry::CacheEntry;

pub use memory::MemoryStore;
pub use registry::global;

/// Callback invoked (with no arguments) when a key's entry changes
pub type Callback = Arc<dyn Fn() + Send + Sync>;

static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of one registered callback
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    pub(crate) fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Token returned by [`ResultStore::subscribe`], needed to unsubscribe
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    key: String,
    id: SubscriptionId,
}

impl Subscription {
    pub(crate) fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            id: SubscriptionId::next(),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn id(&self) -> SubscriptionId {
        self.id
    }
}

/// Operations on a keyed result store
///
/// Implementations must serialize all mutations of a key's entry and subscriber set
/// with respect to each other, and must not hold any internal lock while running
/// callbacks.
pub trait ResultStore<V>: Send + Sync {
    /// Current snapshot for `key`
    fn get(&self, key: &str) -> Option<CacheEntry<V>>;

    /// Replace the entry for `key` wholesale
    fn put(&self, key: &str, entry: CacheEntry<V>);

    /// Replace the entry only while it is still the in-flight operation `handle_id`
    ///
    /// Returns true if the entry was replaced. A settlement uses this so a superseded
    /// operation can never overwrite whatever replaced it.
    fn put_if_pending(&self, key: &str, handle_id: u64, entry: CacheEntry<V>) -> bool;

    /// Compare-and-update `key` under the store's lock
    ///
    /// `f` sees the current entry and returns a replacement, or `None` to leave it as
    /// is. It runs with the lock held and must not call back into the store. Returns
    /// true if the entry was replaced.
    fn update(&self, key: &str, f: &mut dyn FnMut(Option<&CacheEntry<V>>) -> Option<CacheEntry<V>>) -> bool;

    /// Remove the entry for `key` entirely
    fn clear(&self, key: &str);

    /// Remove the entry only while it is still the in-flight operation `handle_id`
    fn clear_if_pending(&self, key: &str, handle_id: u64) -> bool;

    /// Register `callback` for change notifications on `key`
    fn subscribe(&self, key: &str, callback: Callback) -> Subscription;

    /// Remove a registration; the key's subscriber set is dropped once empty
    fn unsubscribe(&self, subscription: &Subscription);

    /// Invoke every callback registered for `key`
    ///
    /// A panicking callback must not prevent the remaining callbacks from running.
    fn notify(&self, key: &str);

    /// Number of callbacks registered for `key`
    fn subscriber_count(&self, key: &str) -> usize;

    /// Number of keys holding an entry
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys holding an entry, in no particular order
    fn keys(&self) -> Vec<String>;
}
