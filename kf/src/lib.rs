//! keyfetch - keyed async fetches bound to a consumer lifecycle
//!
//! Runs a caller-supplied asynchronous producer on behalf of a consumer, exposes the
//! in-flight / result / error status, and optionally shares results between
//! independent consumers through a cache key.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  update(deps)  ┌────────────────────┐   get/update/put   ┌─────────────┐
//! │ FetchBinding │───────────────▶│ RequestCoordinator │───────────────────▶│ ResultStore │
//! │   (Effect)   │                │   epoch, state     │◀───────────────────│  entries    │
//! └──────────────┘                └────────────────────┘   notify(key)      │  subscribers│
//!        ▲                                   │                              └─────────────┘
//!        └────────── watch::Receiver ────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use keyfetch::{Deps, FetchBinding, Producer};
//!
//! let producer = Producer::new(|| async {
//!     tokio::time::sleep(std::time::Duration::from_millis(100)).await;
//!     Ok::<_, std::io::Error>("Data: test".to_string())
//! });
//! let mut binding = FetchBinding::mount_global(producer, None, Deps::new());
//! binding.settled().await;
//! assert_eq!(binding.state().data.as_deref(), Some("Data: test"));
//! ```

pub mod cli;
pub mod config;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod lifecycle;
pub mod producer;
pub mod scenario;
pub mod store;

#[cfg(test)]
mod test_support;

pub use coordinator::{FetchState, RequestCoordinator};
pub use entry::{CacheEntry, PendingHandle, Status};
pub use error::FetchError;
pub use lifecycle::{Deps, Dispose, Effect, FetchBinding};
pub use producer::Producer;
pub use store::{MemoryStore, ResultStore, Subscription, SubscriptionId, global};
