//! FetchBinding - a consumer driven by its host's lifecycle

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::deps::Deps;
use super::effect::{Dispose, Effect};
use crate::coordinator::{FetchState, RequestCoordinator};
use crate::producer::Producer;
use crate::store::{self, ResultStore};

/// Everything whose change restarts the fetch
#[derive(Debug, Clone, PartialEq)]
struct Inputs {
    producer: u64,
    key: Option<String>,
    deps: Deps,
}

/// A mounted consumer
///
/// Mounting attaches and starts a fetch. Each [`update`](Self::update) with a different
/// producer, key or dependency list tears the previous run down and starts again;
/// identical inputs do nothing. Dropping the binding tears it down.
pub struct FetchBinding<V> {
    coordinator: RequestCoordinator<V>,
    effect: Effect<Inputs>,
    task: Option<JoinHandle<()>>,
}

impl<V> FetchBinding<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// Mount against a specific store
    pub fn mount(store: Arc<dyn ResultStore<V>>, producer: Producer<V>, key: Option<String>, deps: Deps) -> Self {
        let mut binding = Self {
            coordinator: RequestCoordinator::new(store),
            effect: Effect::new(),
            task: None,
        };
        binding.update(producer, key, deps);
        binding
    }

    /// Mount against the process-wide store for `V`
    pub fn mount_global(producer: Producer<V>, key: Option<String>, deps: Deps) -> Self {
        Self::mount(store::global::<V>(), producer, key, deps)
    }

    /// Re-evaluate with the host's current inputs; returns true if a new run started
    pub fn update(&mut self, producer: Producer<V>, key: Option<String>, deps: Deps) -> bool {
        let inputs = Inputs {
            producer: producer.id(),
            key,
            deps,
        };
        let coordinator = self.coordinator.clone();
        let mut task = None;

        let ran = self.effect.run(inputs, |inputs| {
            debug!(consumer = coordinator.id(), ?inputs, "FetchBinding::update: running");
            coordinator.attach(inputs.key.clone(), producer.clone());
            if let Some(key) = &inputs.key
                && coordinator.abandon_own_pending(key)
            {
                debug!(consumer = coordinator.id(), %key, "FetchBinding::update: superseded own operation");
            }
            task = coordinator.start_fetch(&producer, inputs.key.as_deref());

            let coordinator = coordinator.clone();
            Dispose::new(move || coordinator.teardown())
        });

        if ran {
            self.task = task;
        }
        ran
    }

    /// Discard any shared result and fetch again
    pub fn refetch(&mut self) {
        if let Some(task) = self.coordinator.refetch() {
            self.task = Some(task);
        }
    }

    /// Wait for the most recently started fetch task, if any
    ///
    /// Returns immediately when the last fetch was served from the store.
    pub async fn settled(&mut self) {
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            warn!(consumer = self.coordinator.id(), error = %e, "FetchBinding::settled: fetch task failed");
        }
    }

    pub fn state(&self) -> FetchState<V> {
        self.coordinator.state()
    }

    pub fn watch(&self) -> watch::Receiver<FetchState<V>> {
        self.coordinator.watch()
    }

    /// Handle that stays usable for refetching after the binding moves
    pub fn coordinator(&self) -> &RequestCoordinator<V> {
        &self.coordinator
    }

    pub fn is_mounted(&self) -> bool {
        self.effect.is_active()
    }

    /// Tear down; any in-flight fetch no longer touches this binding's state
    pub fn unmount(&mut self) {
        debug!(consumer = self.coordinator.id(), "FetchBinding::unmount: called");
        self.effect.dispose();
        self.task = None;
    }
}
