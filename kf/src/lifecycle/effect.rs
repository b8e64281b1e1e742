//! Effect - run setup once per distinct set of inputs, with cleanup in between

use tracing::debug;

/// Cleanup registered by an effect run
pub struct Dispose(Box<dyn FnOnce() + Send>);

impl Dispose {
    pub fn new(f: impl FnOnce() + Send + 'static) -> Self {
        Dispose(Box::new(f))
    }

    /// Cleanup that does nothing
    pub fn noop() -> Self {
        Dispose::new(|| {})
    }

    pub fn run(self) {
        (self.0)()
    }
}

/// The attach/cleanup primitive a host lifecycle provides
///
/// [`run`](Self::run) executes `setup` on the first call and again whenever the inputs
/// differ from the previous run, running the previous run's cleanup first. Disposing
/// (or dropping) the effect runs the outstanding cleanup exactly once.
pub struct Effect<I> {
    inputs: Option<I>,
    cleanup: Option<Dispose>,
    runs: u64,
}

impl<I: PartialEq> Effect<I> {
    pub fn new() -> Self {
        Self {
            inputs: None,
            cleanup: None,
            runs: 0,
        }
    }

    /// Returns true if `setup` ran
    pub fn run(&mut self, inputs: I, setup: impl FnOnce(&I) -> Dispose) -> bool {
        if self.inputs.as_ref() == Some(&inputs) {
            return false;
        }

        if let Some(cleanup) = self.cleanup.take() {
            debug!(runs = self.runs, "Effect::run: inputs changed, cleaning up previous run");
            cleanup.run();
        }

        self.cleanup = Some(setup(&inputs));
        self.inputs = Some(inputs);
        self.runs += 1;
        true
    }

    /// Number of times setup has run
    pub fn runs(&self) -> u64 {
        self.runs
    }

    pub fn is_active(&self) -> bool {
        self.cleanup.is_some()
    }
}

impl<I: PartialEq> Default for Effect<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I> Effect<I> {
    /// Run the outstanding cleanup; the next `run` behaves like a first run
    pub fn dispose(&mut self) {
        self.inputs = None;
        if let Some(cleanup) = self.cleanup.take() {
            cleanup.run();
        }
    }
}

impl<I> Drop for Effect<I> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Dispose + Clone) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &str| {
            sink.lock().unwrap().push(format!("setup {}", label));
            let sink = sink.clone();
            let label = label.to_string();
            Dispose::new(move || sink.lock().unwrap().push(format!("cleanup {}", label)))
        };
        (log, make)
    }

    #[test]
    fn test_runs_once_for_same_inputs() {
        let (log, make) = recorder();
        let mut effect = Effect::new();

        assert!(effect.run(1, |_| make("a")));
        assert!(!effect.run(1, |_| make("b")));
        assert_eq!(effect.runs(), 1);
        assert_eq!(*log.lock().unwrap(), vec!["setup a"]);
    }

    #[test]
    fn test_cleanup_precedes_rerun() {
        let (log, make) = recorder();
        let mut effect = Effect::new();

        effect.run(1, |_| make("a"));
        effect.run(2, |_| make("b"));
        assert_eq!(*log.lock().unwrap(), vec!["setup a", "cleanup a", "setup b"]);
    }

    #[test]
    fn test_dispose_runs_cleanup_once() {
        let (log, make) = recorder();
        let mut effect = Effect::new();

        effect.run(1, |_| make("a"));
        effect.dispose();
        effect.dispose();
        assert!(!effect.is_active());
        drop(effect);
        assert_eq!(*log.lock().unwrap(), vec!["setup a", "cleanup a"]);
    }

    #[test]
    fn test_drop_runs_cleanup() {
        let (log, make) = recorder();
        {
            let mut effect = Effect::new();
            effect.run("x", |_| make("a"));
        }
        assert_eq!(*log.lock().unwrap(), vec!["setup a", "cleanup a"]);
    }

    #[test]
    fn test_rerun_after_dispose() {
        let (log, make) = recorder();
        let mut effect = Effect::new();

        effect.run(1, |_| make("a"));
        effect.dispose();
        assert!(effect.run(1, |_| make("b")));
        assert_eq!(*log.lock().unwrap(), vec!["setup a", "cleanup a", "setup b"]);
    }
}
