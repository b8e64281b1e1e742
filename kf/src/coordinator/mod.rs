//! Request Coordinator - per-consumer fetch logic
//!
//! Each consumer owns one [`RequestCoordinator`]. It tags every fetch attempt with a
//! monotonically increasing epoch and applies a settlement only while that epoch is
//! still the consumer's latest, so a slow, superseded request can never overwrite a
//! newer result.
//!
//! # Keyed fetches
//!
//! ```text
//! start_fetch(key)
//!     │
//!     ├── store: Resolved ─────────────▶ adopt value, no producer call
//!     ├── store: Pending ──────────────▶ await that operation
//!     └── store: absent/Idle/Rejected ─▶ invoke producer (outside the store lock),
//!                                        publish Pending
//!                                            │
//!                        settlement ─────────┘
//!                            │
//!                            ├── still the key's Pending? ─▶ put + notify(key)
//!                            ├── replaced by a newer Pending? ─▶ await that one instead
//!                            └── epoch current? ─▶ apply the key's settled entry
//! ```
//!
//! A keyed settlement always applies what the store ended on, never a result the
//! store rejected, so every consumer of a key converges on the same entry.
//!
//! Every consumer attached to the key mirrors the notified entry into its own
//! [`FetchState`], which hosts observe through [`RequestCoordinator::watch`].

mod core;
mod state;

pub use self::core::RequestCoordinator;
pub use self::state::FetchState;
