//! Producers whose settlement the test controls

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::oneshot;

use crate::producer::Producer;

type Outcome<V> = Result<V, String>;

/// Hands out a producer whose every invocation waits until the test releases it
///
/// Invocations are numbered from 0 in call order.
pub(crate) struct Gate<V> {
    calls: Arc<AtomicUsize>,
    senders: Arc<Mutex<Vec<Option<oneshot::Sender<Outcome<V>>>>>>,
}

impl<V> Gate<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub(crate) fn new() -> Self {
        Self {
            calls: Arc::new(AtomicUsize::new(0)),
            senders: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub(crate) fn producer(&self) -> Producer<V> {
        let calls = self.calls.clone();
        let senders = self.senders.clone();
        Producer::new(move || {
            calls.fetch_add(1, Ordering::SeqCst);
            let (tx, rx) = oneshot::channel();
            senders.lock().unwrap().push(Some(tx));
            async move {
                match rx.await {
                    Ok(outcome) => outcome,
                    Err(_) => Err("gate dropped".to_string()),
                }
            }
        })
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub(crate) fn resolve(&self, invocation: usize, value: impl Into<V>) {
        self.settle(invocation, Ok(value.into()));
    }

    pub(crate) fn reject(&self, invocation: usize, message: &str) {
        self.settle(invocation, Err(message.to_string()));
    }

    fn settle(&self, invocation: usize, outcome: Outcome<V>) {
        let sender = self.senders.lock().unwrap()[invocation]
            .take()
            .expect("invocation already settled");
        let _ = sender.send(outcome);
    }
}
