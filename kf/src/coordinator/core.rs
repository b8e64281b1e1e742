//! RequestCoordinator - issues fetches for one consumer and drops superseded results

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::state::FetchState;
use crate::entry::{CacheEntry, PendingHandle};
use crate::error::FetchError;
use crate::producer::Producer;
use crate::store::{ResultStore, Subscription};

static NEXT_CONSUMER_ID: AtomicU64 = AtomicU64::new(1);

/// Inputs of the current attachment
struct Attachment<V> {
    generation: u64,
    key: Option<String>,
    producer: Producer<V>,
    subscription: Option<Subscription>,
}

/// What the store said when a keyed fetch started
enum Admission<V> {
    /// A resolved value is already shared under the key
    Cached(V),
    /// An operation is already in flight for the key; await it instead of invoking the producer
    Joined(PendingHandle<V>),
    /// This consumer invoked the producer and published the handle
    Started(PendingHandle<V>),
}

struct Inner<V> {
    id: u64,
    store: Arc<dyn ResultStore<V>>,
    /// Bumped on every fetch start and every teardown; a settlement applies only if
    /// the value it captured is still current
    epoch: Mutex<u64>,
    /// Generation of the live attachment, 0 while detached
    generation: AtomicU64,
    next_generation: AtomicU64,
    /// Id of the last pending handle this consumer published, 0 if none
    own_pending: AtomicU64,
    attachment: Mutex<Option<Attachment<V>>>,
    state: watch::Sender<FetchState<V>>,
}

impl<V> Inner<V>
where
    V: Clone + Send + Sync + 'static,
{
    fn lock_epoch(&self) -> MutexGuard<'_, u64> {
        self.epoch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_attachment(&self) -> MutexGuard<'_, Option<Attachment<V>>> {
        self.attachment.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a new attempt: bump the epoch and flip the exposed state to loading
    fn begin_attempt(&self) -> u64 {
        let mut epoch = self.lock_epoch();
        *epoch += 1;
        self.state.send_modify(|state| state.begin());
        *epoch
    }

    fn apply_if_current(&self, my_epoch: u64, f: impl FnOnce(&mut FetchState<V>)) -> bool {
        let epoch = self.lock_epoch();
        if *epoch != my_epoch {
            return false;
        }
        self.state.send_modify(f);
        true
    }

    /// Mirror the key's settled entry into the exposed state
    ///
    /// The entry is read under the epoch lock, so an attempt started or a teardown
    /// performed meanwhile either happens entirely before the read or entirely after
    /// the state was written.
    fn on_store_change(&self, generation: u64, key: &str) {
        let epoch = self.lock_epoch();
        if generation == 0 || self.generation.load(Ordering::SeqCst) != generation {
            debug!(consumer = self.id, %key, generation, "RequestCoordinator::on_store_change: detached, ignoring");
            return;
        }

        let mirrored = match self.store.get(key) {
            Some(CacheEntry::Resolved(value)) => {
                self.state.send_modify(|state| state.resolve(value));
                true
            }
            Some(CacheEntry::Rejected(err)) => {
                self.state.send_modify(|state| state.reject(err));
                true
            }
            _ => false,
        };
        debug!(consumer = self.id, %key, epoch = *epoch, mirrored, "RequestCoordinator::on_store_change");
    }

    fn detach(&self) {
        {
            let mut epoch = self.lock_epoch();
            *epoch += 1;
            self.generation.store(0, Ordering::SeqCst);
        }

        let attachment = self.lock_attachment().take();
        if let Some(Attachment {
            subscription: Some(subscription),
            ..
        }) = attachment
        {
            self.store.unsubscribe(&subscription);
        }
    }
}

impl<V> Drop for Inner<V> {
    fn drop(&mut self) {
        let attachment = self.attachment.get_mut().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(Attachment {
            subscription: Some(subscription),
            ..
        }) = attachment
        {
            self.store.unsubscribe(&subscription);
        }
    }
}

/// One consumer instance
///
/// Cloning yields another handle to the same consumer; hand a clone to whoever needs
/// to call [`refetch`](Self::refetch).
///
/// Fetches run on spawned Tokio tasks, so [`start_fetch`](Self::start_fetch) and
/// [`refetch`](Self::refetch) panic if called outside a Tokio runtime.
pub struct RequestCoordinator<V> {
    inner: Arc<Inner<V>>,
}

impl<V> Clone for RequestCoordinator<V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<V> RequestCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new(store: Arc<dyn ResultStore<V>>) -> Self {
        let id = NEXT_CONSUMER_ID.fetch_add(1, Ordering::Relaxed);
        debug!(consumer = id, "RequestCoordinator::new: called");
        let (state, _) = watch::channel(FetchState::default());
        Self {
            inner: Arc::new(Inner {
                id,
                store,
                epoch: Mutex::new(0),
                generation: AtomicU64::new(0),
                next_generation: AtomicU64::new(1),
                own_pending: AtomicU64::new(0),
                attachment: Mutex::new(None),
                state,
            }),
        }
    }

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    /// Current epoch counter
    pub fn epoch(&self) -> u64 {
        *self.inner.lock_epoch()
    }

    pub fn is_attached(&self) -> bool {
        self.inner.generation.load(Ordering::SeqCst) != 0
    }

    /// Cache key of the live attachment
    pub fn key(&self) -> Option<String> {
        self.inner.lock_attachment().as_ref().and_then(|a| a.key.clone())
    }

    /// Snapshot of the exposed state
    pub fn state(&self) -> FetchState<V> {
        self.inner.state.borrow().clone()
    }

    /// Receiver that observes every change of the exposed state
    pub fn watch(&self) -> watch::Receiver<FetchState<V>> {
        self.inner.state.subscribe()
    }

    /// Bind this consumer to a producer and optional cache key
    ///
    /// When keyed, registers for change notifications on the key so results fetched by
    /// other consumers show up here too. An existing attachment is torn down first.
    pub fn attach(&self, key: Option<String>, producer: Producer<V>) {
        if self.is_attached() {
            debug!(consumer = self.inner.id, "RequestCoordinator::attach: replacing live attachment");
            self.inner.detach();
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let subscription = key.as_ref().map(|key| {
            let weak: Weak<Inner<V>> = Arc::downgrade(&self.inner);
            let watched = key.clone();
            self.inner.store.subscribe(
                key,
                Arc::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_store_change(generation, &watched);
                    }
                }),
            )
        });

        debug!(consumer = self.inner.id, ?key, generation, producer = producer.id(), "RequestCoordinator::attach: called");
        *self.inner.lock_attachment() = Some(Attachment {
            generation,
            key,
            producer,
            subscription,
        });
        self.inner.generation.store(generation, Ordering::SeqCst);
    }

    /// Start a fetch attempt
    ///
    /// Returns the task that applies the settlement, or `None` when the key already held
    /// a resolved value. When an operation for the key is already in flight, whoever
    /// started it, the task awaits that operation and the producer is not invoked.
    pub fn start_fetch(&self, producer: &Producer<V>, key: Option<&str>) -> Option<JoinHandle<()>> {
        let my_epoch = self.inner.begin_attempt();
        debug!(consumer = self.inner.id, my_epoch, ?key, "RequestCoordinator::start_fetch: called");

        let Some(key) = key else {
            let handle = producer.invoke();
            return Some(self.spawn_settlement(my_epoch, None, handle));
        };

        match self.admit(producer, key) {
            Admission::Cached(value) => {
                debug!(consumer = self.inner.id, %key, "RequestCoordinator::start_fetch: served from store");
                self.inner.apply_if_current(my_epoch, |state| state.resolve(value));
                None
            }
            Admission::Joined(handle) => {
                let own = handle.id() == self.inner.own_pending.load(Ordering::SeqCst);
                debug!(
                    consumer = self.inner.id,
                    %key,
                    handle = handle.id(),
                    own,
                    "RequestCoordinator::start_fetch: joining"
                );
                Some(self.spawn_settlement(my_epoch, Some(key.to_string()), handle))
            }
            Admission::Started(handle) => {
                info!(consumer = self.inner.id, %key, handle = handle.id(), "Producer invoked");
                self.inner.own_pending.store(handle.id(), Ordering::SeqCst);
                Some(self.spawn_settlement(my_epoch, Some(key.to_string()), handle))
            }
        }
    }

    /// Decide how a keyed attempt proceeds, publishing a new operation if none exists
    ///
    /// The producer runs outside the store lock. If another operation was published
    /// while it ran, that one is joined and this invocation's handle is dropped unpolled.
    fn admit(&self, producer: &Producer<V>, key: &str) -> Admission<V> {
        match self.inner.store.get(key) {
            Some(CacheEntry::Resolved(value)) => return Admission::Cached(value),
            Some(CacheEntry::Pending(handle)) => return Admission::Joined(handle),
            _ => {}
        }

        let handle = producer.invoke();
        let mut admission = Admission::Started(handle.clone());
        self.inner.store.update(key, &mut |current| match current {
            Some(CacheEntry::Resolved(value)) => {
                admission = Admission::Cached(value.clone());
                None
            }
            Some(CacheEntry::Pending(other)) => {
                admission = Admission::Joined(other.clone());
                None
            }
            _ => Some(CacheEntry::Pending(handle.clone())),
        });

        if let Admission::Joined(other) = &admission {
            debug!(
                consumer = self.inner.id,
                %key,
                dropped = handle.id(),
                winner = other.id(),
                "RequestCoordinator::admit: lost publish race"
            );
        }
        admission
    }

    /// Discard any shared result for the key and fetch again
    ///
    /// Always invokes the producer exactly once. Does nothing while detached.
    pub fn refetch(&self) -> Option<JoinHandle<()>> {
        let inputs = self
            .inner
            .lock_attachment()
            .as_ref()
            .map(|a| (a.producer.clone(), a.key.clone()));

        let Some((producer, key)) = inputs else {
            debug!(consumer = self.inner.id, "RequestCoordinator::refetch: not attached, ignoring");
            return None;
        };

        info!(consumer = self.inner.id, ?key, "Refetch requested");
        if let Some(key) = &key {
            self.inner.store.clear(key);
        }
        self.start_fetch(&producer, key.as_deref())
    }

    /// Detach: invalidate in-flight attempts and stop listening to the store
    ///
    /// Running producers are not cancelled; their results still reach the shared store
    /// but never this consumer's exposed state. Safe to call repeatedly.
    pub fn teardown(&self) {
        debug!(consumer = self.inner.id, "RequestCoordinator::teardown: called");
        self.inner.detach();
    }

    /// Drop the key's entry if it is still this consumer's own in-flight operation
    ///
    /// Used when the consumer's inputs changed: the superseded operation must not be
    /// mistaken for the one the new inputs are waiting on.
    pub(crate) fn abandon_own_pending(&self, key: &str) -> bool {
        let own = self.inner.own_pending.swap(0, Ordering::SeqCst);
        own != 0 && self.inner.store.clear_if_pending(key, own)
    }

    fn spawn_settlement(&self, my_epoch: u64, key: Option<String>, handle: PendingHandle<V>) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let store = self.inner.store.clone();
        let consumer = self.inner.id;

        tokio::spawn(async move {
            let outcome = handle.settled().await;
            if let Some(inner) = weak.upgrade() {
                // Leaves the marker alone if a newer operation replaced it
                inner
                    .own_pending
                    .compare_exchange(handle.id(), 0, Ordering::SeqCst, Ordering::SeqCst)
                    .ok();
            }

            let settled = match key {
                Some(key) => converge(store.as_ref(), &key, handle, outcome).await,
                None => outcome,
            };

            match weak.upgrade() {
                Some(inner) => {
                    if !inner.apply_if_current(my_epoch, |state| state.settle(settled)) {
                        debug!(consumer, my_epoch, "RequestCoordinator: stale result discarded");
                    }
                }
                None => debug!(consumer, "RequestCoordinator: consumer dropped before settlement"),
            }
        })
    }
}

/// Publish a settled operation and return what the key ended on
///
/// The entry only accepts the outcome of the operation it is still waiting on. When a
/// newer operation replaced it, that one is awaited instead, so every consumer of the
/// key applies the value the store holds. Falls back to `outcome` if the entry is gone.
async fn converge<V>(
    store: &dyn ResultStore<V>,
    key: &str,
    mut handle: PendingHandle<V>,
    mut outcome: Result<V, FetchError>,
) -> Result<V, FetchError>
where
    V: Clone + Send + Sync + 'static,
{
    loop {
        if store.put_if_pending(key, handle.id(), outcome.clone().into()) {
            store.notify(key);
        }

        match store.get(key) {
            Some(CacheEntry::Resolved(value)) => return Ok(value),
            Some(CacheEntry::Rejected(err)) => return Err(err),
            Some(CacheEntry::Pending(next)) if next.id() != handle.id() => {
                debug!(%key, superseded = handle.id(), next = next.id(), "converge: following newer operation");
                outcome = next.settled().await;
                handle = next;
            }
            _ => return outcome,
        }
    }
}
