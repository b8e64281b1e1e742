//! Integration tests for keyfetch
//!
//! These exercise the public API end to end: bindings, coordinators and the shared
//! store together, plus the `kf` binary.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;
use tokio::sync::oneshot;

use keyfetch::{Deps, FetchBinding, MemoryStore, Producer, RequestCoordinator, ResultStore, Status};

/// Producer whose invocations settle when the test says so
struct Manual {
    calls: Arc<AtomicUsize>,
    pending: Arc<Mutex<Vec<oneshot::Sender<Result<String, String>>>>>,
}

impl Manual {
    fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn producer(&self) -> Producer<String> {
        let calls = self.calls.clone();
        let pending = self.pending.clone();
        Producer::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            pending.lock().unwrap().push(tx);
            async move { rx.await.unwrap_or_else(|_| Err("dropped".to_string())) }
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Settle the oldest outstanding invocation
    fn settle(&self, outcome: Result<&str, &str>) {
        let tx = self.pending.lock().unwrap().remove(0);
        let _ = tx.send(outcome.map(str::to_string).map_err(str::to_string));
    }
}

fn store() -> Arc<MemoryStore<String>> {
    Arc::new(MemoryStore::new())
}

fn mount(store: &Arc<MemoryStore<String>>, producer: Producer<String>, key: Option<&str>) -> FetchBinding<String> {
    FetchBinding::<String>::mount(store.clone(), producer, key.map(str::to_string), Deps::new())
}

// =============================================================================
// Fetch Scenarios
// =============================================================================

#[tokio::test]
async fn test_unkeyed_fetch_after_delay() {
    let producer = Producer::new(|| async {
        tokio::time::sleep(Duration::from_millis(100)).await;
        Ok::<_, String>("Data: test".to_string())
    });

    let mut binding = mount(&store(), producer, None);
    let state = binding.state();
    assert!(state.is_loading);
    assert_eq!(state.data, None);

    binding.settled().await;
    let state = binding.state();
    assert_eq!(state.data.as_deref(), Some("Data: test"));
    assert_eq!(state.error, None);
    assert!(!state.is_loading);
    assert_eq!(state.status, Status::Resolved);
}

#[tokio::test]
async fn test_two_consumers_share_one_invocation() {
    let store = store();
    let manual = Manual::new();
    let producer = manual.producer();

    let mut a = mount(&store, producer.clone(), Some("k"));
    let mut b = mount(&store, producer.clone(), Some("k"));
    assert_eq!(manual.calls(), 1);

    manual.settle(Ok("shared"));
    a.settled().await;
    b.settled().await;

    assert_eq!(manual.calls(), 1);
    assert_eq!(a.state().data.as_deref(), Some("shared"));
    assert_eq!(b.state().data, a.state().data);
}

#[tokio::test]
async fn test_late_consumer_served_from_store() {
    let store = store();
    let manual = Manual::new();

    let mut first = mount(&store, manual.producer(), Some("users"));
    manual.settle(Ok("cached"));
    first.settled().await;

    let second = mount(&store, manual.producer(), Some("users"));
    assert_eq!(manual.calls(), 1);
    assert_eq!(second.state().data.as_deref(), Some("cached"));
    assert!(!second.state().is_loading);
}

#[tokio::test]
async fn test_dependency_change_race() {
    let slow = Manual::new();
    let fast = Manual::new();
    let mut binding = FetchBinding::<String>::mount(store(), slow.producer(), None, Deps::of(["a"]));

    binding.update(fast.producer(), None, Deps::of(["b"]));
    fast.settle(Ok("B"));
    binding.settled().await;

    slow.settle(Ok("A"));
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(binding.state().data.as_deref(), Some("B"));
}

#[tokio::test]
async fn test_refetch_fans_out() {
    let store = store();
    let manual = Manual::new();
    let producer = manual.producer();
    let mut bindings: Vec<_> = (0..3).map(|_| mount(&store, producer.clone(), Some("feed"))).collect();

    manual.settle(Ok("v1"));
    for binding in &mut bindings {
        binding.settled().await;
    }

    bindings[2].refetch();
    assert_eq!(manual.calls(), 2);
    for binding in &bindings {
        assert_eq!(binding.state().data.as_deref(), Some("v1"));
    }

    manual.settle(Ok("v2"));
    bindings[2].settled().await;
    for binding in &bindings {
        assert_eq!(binding.state().data.as_deref(), Some("v2"));
    }
    assert_eq!(manual.calls(), 2);
}

#[tokio::test]
async fn test_competing_refetches_agree() {
    let store = store();
    let manual = Manual::new();
    let producer = manual.producer();
    let mut a = mount(&store, producer.clone(), Some("feed"));
    let mut b = mount(&store, producer.clone(), Some("feed"));
    manual.settle(Ok("v1"));
    a.settled().await;
    b.settled().await;

    a.refetch();
    b.refetch();
    assert_eq!(manual.calls(), 3);

    manual.settle(Ok("from-a"));
    manual.settle(Ok("from-b"));
    a.settled().await;
    b.settled().await;

    let stored = store.get("feed").and_then(|e| e.value().cloned());
    assert_eq!(stored.as_deref(), Some("from-b"));
    assert_eq!(a.state().data, stored);
    assert_eq!(b.state().data, stored);
}

#[tokio::test]
async fn test_teardown_before_settlement() {
    let store = store();
    let manual = Manual::new();
    let mut binding = mount(&store, manual.producer(), Some("k"));
    let mut rx = binding.watch();
    let _ = rx.borrow_and_update();

    binding.unmount();
    manual.settle(Ok("late"));
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(!rx.has_changed().unwrap());
    assert!(binding.state().is_loading);
    assert_eq!(store.get("k").and_then(|e| e.value().cloned()), Some("late".to_string()));
    assert_eq!(store.subscriber_count("k"), 0);
}

#[tokio::test]
async fn test_rejection_then_recovery() {
    let store = store();
    let manual = Manual::new();

    let mut first = mount(&store, manual.producer(), Some("k"));
    manual.settle(Err("503"));
    first.settled().await;
    let state = first.state();
    assert_eq!(state.status, Status::Rejected);
    assert_eq!(state.error.map(|e| e.message), Some("503".to_string()));

    let mut second = mount(&store, manual.producer(), Some("k"));
    assert_eq!(manual.calls(), 2);

    manual.settle(Ok("back"));
    second.settled().await;
    assert_eq!(second.state().data.as_deref(), Some("back"));
    assert_eq!(first.state().data.as_deref(), Some("back"));
    assert_eq!(first.state().error, None);
}

#[tokio::test]
async fn test_coordinator_without_binding() {
    let store = store();
    let manual = Manual::new();
    let producer = manual.producer();
    let coordinator = RequestCoordinator::<String>::new(store.clone());
    coordinator.attach(Some("raw".to_string()), producer.clone());

    let task = coordinator.start_fetch(&producer, Some("raw")).unwrap();
    assert_eq!(store.get("raw").map(|e| e.status()), Some(Status::Pending));

    manual.settle(Ok("direct"));
    task.await.unwrap();
    assert_eq!(coordinator.state().data.as_deref(), Some("direct"));
    assert_eq!(store.get("raw").map(|e| e.status()), Some(Status::Resolved));
}

#[tokio::test]
async fn test_global_store_shared_between_bindings() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counted = calls.clone();
    let producer = Producer::new(move || {
        counted.fetch_add(1, Ordering::SeqCst);
        async { Ok::<_, String>(7u32) }
    });

    let key = Some("integration-global".to_string());
    let mut a = FetchBinding::mount_global(producer.clone(), key.clone(), Deps::new());
    a.settled().await;
    let b = FetchBinding::mount_global(producer, key, Deps::new());

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(b.state().data, Some(7));
    assert!(keyfetch::global::<u32>().get("integration-global").is_some());
}

// =============================================================================
// CLI Tests
// =============================================================================

fn kf(dir: &TempDir) -> Command {
    let config = dir.path().join("keyfetch.yml");
    std::fs::write(&config, "demo:\n  delay_ms: 10\n").unwrap();
    let mut cmd = Command::cargo_bin("kf").expect("bin");
    cmd.current_dir(dir.path()).arg("--config").arg(config);
    cmd
}

#[test]
fn test_cli_demo_basic() {
    let dir = TempDir::new().unwrap();
    kf(&dir)
        .args(["demo", "basic"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Data: test"));
}

#[test]
fn test_cli_demo_all() {
    let dir = TempDir::new().unwrap();
    kf(&dir)
        .arg("demo")
        .assert()
        .success()
        .stdout(predicate::str::contains("rejected").and(predicate::str::contains("✗").not()));
}

#[test]
fn test_cli_lists_scenarios() {
    let dir = TempDir::new().unwrap();
    kf(&dir)
        .arg("scenarios")
        .assert()
        .success()
        .stdout(predicate::str::contains("race").and(predicate::str::contains("teardown")));
}

#[test]
fn test_cli_prints_effective_config() {
    let dir = TempDir::new().unwrap();
    kf(&dir)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("delay_ms: 10").and(predicate::str::contains("consumers: 2")));
}

#[test]
fn test_cli_rejects_unknown_scenario() {
    let dir = TempDir::new().unwrap();
    kf(&dir).args(["demo", "nope"]).assert().failure();
}
