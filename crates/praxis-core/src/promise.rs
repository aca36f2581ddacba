use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Terminal outcome of a pursued goal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GoalResult {
    Success,
    Fail,
    Dropped,
}

impl fmt::Display for GoalResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GoalResult::Success => write!(f, "SUCCESS"),
            GoalResult::Fail => write!(f, "FAIL"),
            GoalResult::Dropped => write!(f, "DROPPED"),
        }
    }
}

type Callback = Box<dyn FnOnce(GoalResult) + Send>;

struct PromiseState {
    result: Option<GoalResult>,
    callbacks: Vec<Callback>,
}

/// Single-fire completion cell for a pursued goal. Callbacks registered
/// after completion run immediately with the stored result.
///
/// Hazard (inherited API behaviour): when two pursues merge into one
/// desire, the desire adopts the *latest* promise and the earlier one is
/// dropped without ever firing.
#[derive(Clone)]
pub struct Promise {
    inner: Arc<Mutex<PromiseState>>,
}

impl Promise {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(PromiseState {
                result: None,
                callbacks: Vec::new(),
            })),
        }
    }

    /// Register success/fail callbacks. `Dropped` runs the fail arm.
    pub fn then(
        &self,
        on_success: impl FnOnce() + Send + 'static,
        on_fail: impl FnOnce() + Send + 'static,
    ) {
        self.on_result(move |result| match result {
            GoalResult::Success => on_success(),
            GoalResult::Fail | GoalResult::Dropped => on_fail(),
        });
    }

    /// Register a callback receiving the terminal result.
    pub fn on_result(&self, callback: impl FnOnce(GoalResult) + Send + 'static) {
        let mut state = self.inner.lock();
        match state.result {
            Some(result) => {
                drop(state);
                callback(result);
            }
            None => state.callbacks.push(Box::new(callback)),
        }
    }

    /// Fire the promise. Returns false (and does nothing) when it has
    /// already fired; completion is at-most-once.
    pub fn complete(&self, result: GoalResult) -> bool {
        let callbacks = {
            let mut state = self.inner.lock();
            if state.result.is_some() {
                return false;
            }
            state.result = Some(result);
            std::mem::take(&mut state.callbacks)
        };
        for callback in callbacks {
            callback(result);
        }
        true
    }

    pub fn result(&self) -> Option<GoalResult> {
        self.inner.lock().result
    }

    pub fn is_complete(&self) -> bool {
        self.result().is_some()
    }
}

impl Default for Promise {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Promise {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Promise")
            .field("result", &self.result())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn fires_once() {
        let promise = Promise::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        promise.on_result(move |_| {
            h.fetch_add(1, Ordering::SeqCst);
        });

        assert!(promise.complete(GoalResult::Success));
        assert!(!promise.complete(GoalResult::Fail));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(promise.result(), Some(GoalResult::Success));
    }

    #[test]
    fn late_registration_runs_immediately() {
        let promise = Promise::new();
        promise.complete(GoalResult::Dropped);

        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        promise.then(
            || unreachable!("dropped goals take the fail arm"),
            move || {
                h.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }
}
