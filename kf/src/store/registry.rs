//! Process-wide stores, one per value type

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use tracing::debug;

use super::MemoryStore;

type Registry = Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static STORES: OnceLock<Registry> = OnceLock::new();

/// The process-wide store for values of type `V`
///
/// Created empty on first use and never torn down. Every consumer fetching `V` through
/// the global store shares its keys with every other such consumer.
pub fn global<V>() -> Arc<MemoryStore<V>>
where
    V: Clone + Send + Sync + 'static,
{
    let type_id = TypeId::of::<V>();
    let mut stores = STORES
        .get_or_init(Default::default)
        .lock()
        .unwrap_or_else(PoisonError::into_inner);

    if let Some(existing) = stores.get(&type_id).cloned()
        && let Ok(store) = existing.downcast::<MemoryStore<V>>()
    {
        return store;
    }

    debug!(value_type = std::any::type_name::<V>(), "global: creating store");
    let store = Arc::new(MemoryStore::<V>::new());
    stores.insert(type_id, store.clone());
    store
}
