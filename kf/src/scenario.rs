//! Demonstration scenarios run by `kf demo`
//!
//! Each scenario drives the real library against a fresh [`MemoryStore`] with
//! producers that sleep for the configured delay, records what it observed, and
//! checks the outcome the fetch layer guarantees.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use clap::ValueEnum;
use tracing::{debug, info};

use crate::config::DemoConfig;
use crate::coordinator::FetchState;
use crate::entry::Status;
use crate::lifecycle::{Deps, FetchBinding};
use crate::producer::Producer;
use crate::store::{MemoryStore, ResultStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    Basic,
    Shared,
    Race,
    Refetch,
    Teardown,
    Rejected,
}

impl Scenario {
    pub fn all() -> &'static [Scenario] {
        &[
            Scenario::Basic,
            Scenario::Shared,
            Scenario::Race,
            Scenario::Refetch,
            Scenario::Teardown,
            Scenario::Rejected,
        ]
    }

    pub fn name(&self) -> &'static str {
        match self {
            Scenario::Basic => "basic",
            Scenario::Shared => "shared",
            Scenario::Race => "race",
            Scenario::Refetch => "refetch",
            Scenario::Teardown => "teardown",
            Scenario::Rejected => "rejected",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Scenario::Basic => "unkeyed fetch resolves and clears the loading flag",
            Scenario::Shared => "consumers sharing a key invoke the producer once",
            Scenario::Race => "a slow superseded request never overwrites a newer result",
            Scenario::Refetch => "refetch on one consumer updates every consumer of the key",
            Scenario::Teardown => "a result arriving after teardown leaves the consumer untouched",
            Scenario::Rejected => "a rejected key is fetched again by the next consumer",
        }
    }
}

/// What a scenario observed
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub scenario: Scenario,
    pub lines: Vec<String>,
    pub passed: bool,
}

impl ScenarioReport {
    fn new(scenario: Scenario) -> Self {
        Self {
            scenario,
            lines: Vec::new(),
            passed: false,
        }
    }

    fn step(&mut self, line: impl Into<String>) {
        let line = line.into();
        debug!(scenario = self.scenario.name(), %line, "ScenarioReport::step");
        self.lines.push(line);
    }

    fn check(mut self, passed: bool) -> Self {
        self.passed = passed;
        info!(scenario = self.scenario.name(), passed, "Scenario finished");
        self
    }
}

/// Run one scenario to completion
pub async fn run(scenario: Scenario, config: &DemoConfig) -> ScenarioReport {
    debug!(scenario = scenario.name(), ?config, "run: called");
    let delay = Duration::from_millis(config.delay_ms);
    let consumers = config.consumers.max(2);
    let key = config.key.clone();

    match scenario {
        Scenario::Basic => basic(delay).await,
        Scenario::Shared => shared(delay, consumers, key).await,
        Scenario::Race => race(delay).await,
        Scenario::Refetch => refetch(delay, consumers, key).await,
        Scenario::Teardown => teardown(delay, key).await,
        Scenario::Rejected => rejected(delay, key).await,
    }
}

fn fresh_store() -> Arc<dyn ResultStore<String>> {
    Arc::new(MemoryStore::<String>::new())
}

/// Producer that counts invocations and settles with `outcome(n)` after `delay`
fn sleeper<F>(calls: &Arc<AtomicUsize>, delay: Duration, outcome: F) -> Producer<String>
where
    F: Fn(usize) -> Result<String, String> + Send + Sync + 'static,
{
    let calls = calls.clone();
    Producer::new(move || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        let result = outcome(n);
        async move {
            tokio::time::sleep(delay).await;
            result
        }
    })
}

fn describe(state: &FetchState<String>) -> String {
    format!(
        "status={} loading={} data={:?} error={:?}",
        state.status,
        state.is_loading,
        state.data,
        state.error.as_ref().map(|e| e.message.as_str())
    )
}

async fn basic(delay: Duration) -> ScenarioReport {
    let mut report = ScenarioReport::new(Scenario::Basic);
    let calls = Arc::new(AtomicUsize::new(0));
    let producer = sleeper(&calls, delay, |_| Ok("Data: test".to_string()));

    let mut binding = FetchBinding::mount(fresh_store(), producer, None, Deps::new());
    report.step(format!("mounted: {}", describe(&binding.state())));

    binding.settled().await;
    let state = binding.state();
    report.step(format!("settled: {}", describe(&state)));

    let passed = state.data.as_deref() == Some("Data: test") && state.error.is_none() && !state.is_loading;
    report.check(passed)
}

async fn shared(delay: Duration, consumers: usize, key: String) -> ScenarioReport {
    let mut report = ScenarioReport::new(Scenario::Shared);
    let store = fresh_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let producer = sleeper(&calls, delay, |n| Ok(format!("shared value #{}", n)));

    let mut bindings: Vec<_> = (0..consumers)
        .map(|_| FetchBinding::mount(store.clone(), producer.clone(), Some(key.clone()), Deps::new()))
        .collect();
    report.step(format!("mounted {} consumers on key {:?}", consumers, key));

    for binding in &mut bindings {
        binding.settled().await;
    }

    let values: Vec<_> = bindings.iter().map(|b| b.state().data).collect();
    for (i, value) in values.iter().enumerate() {
        report.step(format!("consumer {}: data={:?}", i, value));
    }
    let count = calls.load(Ordering::SeqCst);
    report.step(format!("producer invocations: {}", count));

    let converged = values.iter().all(|v| v.is_some() && *v == values[0]);
    report.check(count == 1 && converged)
}

async fn race(delay: Duration) -> ScenarioReport {
    let mut report = ScenarioReport::new(Scenario::Race);
    let calls = Arc::new(AtomicUsize::new(0));
    let slow = sleeper(&calls, delay * 3, |_| Ok("A".to_string()));
    let fast = sleeper(&calls, delay, |_| Ok("B".to_string()));

    let mut binding = FetchBinding::mount(fresh_store(), slow, None, Deps::of(["a"]));
    report.step("started slow request A");
    binding.update(fast, None, Deps::of(["b"]));
    report.step("dependency changed, started fast request B");

    binding.settled().await;
    report.step(format!("after B settled: {}", describe(&binding.state())));

    tokio::time::sleep(delay * 3).await;
    let state = binding.state();
    report.step(format!("after A settled: {}", describe(&state)));

    report.check(state.data.as_deref() == Some("B") && !state.is_loading)
}

async fn refetch(delay: Duration, consumers: usize, key: String) -> ScenarioReport {
    let mut report = ScenarioReport::new(Scenario::Refetch);
    let store = fresh_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let producer = sleeper(&calls, delay, |n| Ok(format!("v{}", n)));

    let mut bindings: Vec<_> = (0..consumers)
        .map(|_| FetchBinding::mount(store.clone(), producer.clone(), Some(key.clone()), Deps::new()))
        .collect();
    for binding in &mut bindings {
        binding.settled().await;
    }
    report.step(format!("initial: {:?}", bindings[0].state().data));

    bindings[0].refetch();
    report.step("consumer 0 requested refetch");
    bindings[0].settled().await;

    let values: Vec<_> = bindings.iter().map(|b| b.state().data).collect();
    for (i, value) in values.iter().enumerate() {
        report.step(format!("consumer {}: data={:?}", i, value));
    }
    let count = calls.load(Ordering::SeqCst);
    report.step(format!("producer invocations: {}", count));

    let updated = values.iter().all(|v| v.as_deref() == Some("v2"));
    report.check(count == 2 && updated)
}

async fn teardown(delay: Duration, key: String) -> ScenarioReport {
    let mut report = ScenarioReport::new(Scenario::Teardown);
    let store = fresh_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let producer = sleeper(&calls, delay, |_| Ok("late".to_string()));

    let mut binding = FetchBinding::mount(store.clone(), producer, Some(key.clone()), Deps::new());
    let coordinator = binding.coordinator().clone();
    binding.unmount();
    report.step(format!("unmounted while loading: {}", describe(&coordinator.state())));

    tokio::time::sleep(delay * 2).await;
    let state = coordinator.state();
    let stored = store.get(&key).map(|e| e.status());
    report.step(format!("after settlement: {}", describe(&state)));
    report.step(format!("store entry for {:?}: {:?}", key, stored));

    let untouched = state.is_loading && state.data.is_none();
    report.check(untouched && stored == Some(Status::Resolved) && store.subscriber_count(&key) == 0)
}

async fn rejected(delay: Duration, key: String) -> ScenarioReport {
    let mut report = ScenarioReport::new(Scenario::Rejected);
    let store = fresh_store();
    let calls = Arc::new(AtomicUsize::new(0));
    let producer = sleeper(&calls, delay, |n| {
        if n == 1 {
            Err("upstream unavailable".to_string())
        } else {
            Ok("recovered".to_string())
        }
    });

    let mut first = FetchBinding::mount(store.clone(), producer.clone(), Some(key.clone()), Deps::new());
    first.settled().await;
    let rejected = first.state();
    report.step(format!("first consumer: {}", describe(&rejected)));

    let mut second = FetchBinding::mount(store.clone(), producer, Some(key.clone()), Deps::new());
    second.settled().await;
    report.step(format!("second consumer: {}", describe(&second.state())));
    report.step(format!("first consumer after notify: {}", describe(&first.state())));

    let count = calls.load(Ordering::SeqCst);
    report.step(format!("producer invocations: {}", count));

    let passed = rejected.error.is_some()
        && count == 2
        && second.state().data.as_deref() == Some("recovered")
        && first.state().data.as_deref() == Some("recovered");
    report.check(passed)
}
