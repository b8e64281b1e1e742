//! Host lifecycle integration
//!
//! A host (typically a UI component runtime) gives the fetch layer two primitives:
//! run something once a unit is attached or its inputs change, and run a cleanup
//! before the next run and when the unit goes away. [`Effect`] models that pair, and
//! [`FetchBinding`] builds the dependency-driven refetch trigger on top of it.
//!
//! # Example
//!
//! ```ignore
//! use keyfetch::{Deps, FetchBinding, Producer};
//!
//! let producer = Producer::new(|| async { Ok::<_, std::io::Error>("Data: test".to_string()) });
//! let mut binding = FetchBinding::mount_global(producer, Some("greeting".into()), Deps::new());
//! binding.settled().await;
//! assert_eq!(binding.state().data.as_deref(), Some("Data: test"));
//! ```

mod binding;
mod deps;
mod effect;

pub use binding::FetchBinding;
pub use deps::Deps;
pub use effect::{Dispose, Effect};
