//! Producer - the caller-supplied async work behind a fetch

use std::fmt::{self, Display};
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{self, BoxFuture};

use crate::entry::PendingHandle;
use crate::error::FetchError;

static NEXT_PRODUCER_ID: AtomicU64 = AtomicU64::new(1);

type ProduceFn<V> = dyn Fn() -> BoxFuture<'static, Result<V, FetchError>> + Send + Sync;

/// A cloneable async producer with a stable identity
///
/// Clones share one identity; two producers built from separate `new` calls never
/// compare equal even if they wrap the same closure. Identity is what the lifecycle
/// layer compares to decide whether the producer changed between evaluations.
pub struct Producer<V> {
    id: u64,
    produce: Arc<ProduceFn<V>>,
}

impl<V> Producer<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Wrap a closure whose future fails with any displayable error
    pub fn new<F, Fut, E>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<V, E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let produce = move || f().map(|outcome| outcome.map_err(FetchError::from_display)).boxed();
        Self {
            id: NEXT_PRODUCER_ID.fetch_add(1, Ordering::Relaxed),
            produce: Arc::new(produce),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Invoke the producer once, wrapping the resulting future in a shareable handle
    ///
    /// The producer's future is lazy: it starts running when the handle is first awaited.
    /// A panic while building the future settles the handle as a rejection.
    pub fn invoke(&self) -> PendingHandle<V> {
        match catch_unwind(AssertUnwindSafe(|| (self.produce)())) {
            Ok(produced) => PendingHandle::new(produced),
            Err(payload) => PendingHandle::new(future::ready(Err(FetchError::from_panic(payload)))),
        }
    }
}

impl<V> Clone for Producer<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            produce: self.produce.clone(),
        }
    }
}

impl<V> PartialEq for Producer<V> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<V> fmt::Debug for Producer<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Producer").field("id", &self.id).finish()
    }
}
