//! Cache entries and in-flight handles

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};

use crate::error::FetchError;

/// Handle ids start at 1 so 0 never matches a real handle
static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Fetch status, both for cache entries and for a consumer's exposed state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    #[default]
    Idle,
    Pending,
    Resolved,
    Rejected,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Idle => "idle",
            Status::Pending => "pending",
            Status::Resolved => "resolved",
            Status::Rejected => "rejected",
        };
        write!(f, "{}", s)
    }
}

type Settlement<V> = Shared<BoxFuture<'static, Result<V, FetchError>>>;

/// An in-flight producer invocation that any number of consumers can await
///
/// The id is process-unique and is the only thing compared when deciding whether two
/// handles refer to the same operation. Panics inside the producer future are caught
/// and settle the handle as a rejection.
pub struct PendingHandle<V> {
    id: u64,
    settlement: Settlement<V>,
}

impl<V> PendingHandle<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<V, FetchError>> + Send + 'static,
    {
        let id = NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed);
        let settlement = AssertUnwindSafe(future)
            .catch_unwind()
            .map(|outcome| outcome.unwrap_or_else(|payload| Err(FetchError::from_panic(payload))))
            .boxed()
            .shared();
        Self { id, settlement }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Future resolving to the operation's outcome; every clone sees the same result
    pub fn settled(&self) -> impl Future<Output = Result<V, FetchError>> + Send + 'static {
        self.settlement.clone()
    }
}

impl<V> Clone for PendingHandle<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            settlement: self.settlement.clone(),
        }
    }
}

impl<V> PartialEq for PendingHandle<V> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<V> fmt::Debug for PendingHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingHandle").field("id", &self.id).finish()
    }
}

/// The shared state of one cache key
///
/// Exactly one payload exists per variant, matching the status it reports.
#[derive(Debug, Clone)]
pub enum CacheEntry<V> {
    Idle,
    Pending(PendingHandle<V>),
    Resolved(V),
    Rejected(FetchError),
}

impl<V> CacheEntry<V> {
    pub fn status(&self) -> Status {
        match self {
            CacheEntry::Idle => Status::Idle,
            CacheEntry::Pending(_) => Status::Pending,
            CacheEntry::Resolved(_) => Status::Resolved,
            CacheEntry::Rejected(_) => Status::Rejected,
        }
    }

    /// True when this entry is the in-flight operation with the given handle id
    pub fn is_pending_for(&self, handle_id: u64) -> bool {
        matches!(self, CacheEntry::Pending(handle) if handle.id == handle_id)
    }

    pub fn value(&self) -> Option<&V> {
        match self {
            CacheEntry::Resolved(value) => Some(value),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&FetchError> {
        match self {
            CacheEntry::Rejected(err) => Some(err),
            _ => None,
        }
    }
}

impl<V> From<Result<V, FetchError>> for CacheEntry<V> {
    fn from(outcome: Result<V, FetchError>) -> Self {
        match outcome {
            Ok(value) => CacheEntry::Resolved(value),
            Err(err) => CacheEntry::Rejected(err),
        }
    }
}
