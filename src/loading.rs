//! Operation-level loading state tracking.
//!
//! Tracks in-flight operations by **label**, not by request id: two calls
//! sharing a label occupy one slot and the last write wins. That is an
//! intentional simplification — callers needing independent tracking choose
//! unique labels.
//!
//! Subscribers receive a [`LoadingSnapshot`] on every start, stop, and
//! progress change. A panicking subscriber is isolated and logged so the
//! remaining subscribers still run.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// State of one tracked operation.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingState {
    /// Caller-chosen label identifying the operation.
    pub operation: String,
    /// Always true while the slot exists.
    pub is_loading: bool,
    /// Optional progress in `0.0..=1.0`.
    pub progress: Option<f64>,
}

/// Snapshot delivered to subscribers on every change.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadingSnapshot {
    /// Whether any operation is active.
    pub is_loading: bool,
    /// Active operation labels, comma-joined.
    pub operations: String,
}

/// Identifier returned by [`LoadingTracker::subscribe`] for later removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn Fn(&LoadingSnapshot) + Send + Sync>;

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(u64, Subscriber)>,
}

/// Tracks which labeled operations are in flight.
#[derive(Default)]
pub struct LoadingTracker {
    operations: Mutex<HashMap<String, LoadingState>>,
    subscribers: Mutex<Subscribers>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl LoadingTracker {
    /// Create an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `operation` as in flight, overwriting any existing slot.
    pub fn start(&self, operation: &str, progress: Option<f64>) {
        lock(&self.operations).insert(
            operation.to_string(),
            LoadingState {
                operation: operation.to_string(),
                is_loading: true,
                progress,
            },
        );
        self.notify();
    }

    /// Update progress for a tracked operation; no-op when untracked.
    pub fn update_progress(&self, operation: &str, progress: f64) {
        {
            let mut operations = lock(&self.operations);
            let Some(state) = operations.get_mut(operation) else {
                return;
            };
            state.progress = Some(progress);
        }
        self.notify();
    }

    /// Remove the slot for `operation`.
    pub fn stop(&self, operation: &str) {
        lock(&self.operations).remove(operation);
        self.notify();
    }

    /// Whether a specific operation is tracked.
    #[must_use]
    pub fn is_loading(&self, operation: &str) -> bool {
        lock(&self.operations).contains_key(operation)
    }

    /// Whether any operation is tracked.
    #[must_use]
    pub fn is_any_loading(&self) -> bool {
        !lock(&self.operations).is_empty()
    }

    /// Number of active operations.
    #[must_use]
    pub fn active_count(&self) -> usize {
        lock(&self.operations).len()
    }

    /// Register a subscriber; returns an id for [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(
        &self,
        callback: impl Fn(&LoadingSnapshot) + Send + Sync + 'static,
    ) -> SubscriptionId {
        let mut subscribers = lock(&self.subscribers);
        let id = subscribers.next_id;
        subscribers.next_id += 1;
        subscribers.entries.push((id, Box::new(callback)));
        SubscriptionId(id)
    }

    /// Remove a subscriber. Idempotent.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        lock(&self.subscribers)
            .entries
            .retain(|(entry_id, _)| *entry_id != id.0);
    }

    /// Current snapshot of the global loading state.
    #[must_use]
    pub fn snapshot(&self) -> LoadingSnapshot {
        let operations = lock(&self.operations);
        let mut labels: Vec<&str> = operations.keys().map(String::as_str).collect();
        labels.sort_unstable();
        LoadingSnapshot {
            is_loading: !operations.is_empty(),
            operations: labels.join(", "),
        }
    }

    fn notify(&self) {
        let snapshot = self.snapshot();
        let subscribers = lock(&self.subscribers);
        for (id, callback) in &subscribers.entries {
            // One misbehaving subscriber must not starve the rest.
            if catch_unwind(AssertUnwindSafe(|| callback(&snapshot))).is_err() {
                tracing::error!(subscriber = id, "Loading subscriber panicked");
            }
        }
    }

    /// Track `future` under `operation` for its full duration.
    ///
    /// The slot is removed however the future ends: normal completion,
    /// error, panic, or being dropped mid-await (e.g. losing a `select!`).
    /// The original result is returned unchanged.
    ///
    /// # Errors
    ///
    /// Propagates the error from `future` after tracking has stopped.
    pub async fn with_loading<F, T, E>(&self, operation: &str, future: F) -> Result<T, E>
    where
        F: Future<Output = Result<T, E>>,
    {
        self.start(operation, None);
        let _guard = StopGuard {
            tracker: self,
            operation,
        };
        future.await
    }
}

/// Stops tracking on drop, so the slot clears on unwind and cancellation,
/// not just on normal completion.
struct StopGuard<'a> {
    tracker: &'a LoadingTracker,
    operation: &'a str,
}

impl Drop for StopGuard<'_> {
    fn drop(&mut self) {
        self.tracker.stop(self.operation);
    }
}

impl std::fmt::Debug for LoadingTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingTracker")
            .field("active", &self.active_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]

    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_start_stop_updates_flags() {
        let tracker = LoadingTracker::new();
        assert!(!tracker.is_any_loading());

        tracker.start("fetch", None);
        assert!(tracker.is_loading("fetch"));
        assert!(tracker.is_any_loading());

        tracker.stop("fetch");
        assert!(!tracker.is_loading("fetch"));
        assert!(!tracker.is_any_loading());
    }

    #[test]
    fn test_same_label_shares_one_slot() {
        let tracker = LoadingTracker::new();
        tracker.start("op", Some(0.2));
        tracker.start("op", Some(0.9)); // last write wins
        assert_eq!(tracker.active_count(), 1);

        tracker.stop("op");
        assert_eq!(tracker.active_count(), 0);
    }

    #[test]
    fn test_update_progress_ignores_untracked() {
        let tracker = LoadingTracker::new();
        tracker.update_progress("ghost", 0.5);
        assert!(!tracker.is_loading("ghost"));
    }

    #[test]
    fn test_subscribers_observe_changes() {
        let tracker = LoadingTracker::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let id = tracker.subscribe(move |snap| {
            seen_clone.lock().unwrap().push(snap.clone());
        });

        tracker.start("a", None);
        tracker.start("b", None);
        tracker.stop("a");

        let events = seen.lock().unwrap().clone();
        assert_eq!(events.len(), 3);
        assert!(events[0].is_loading);
        assert_eq!(events[1].operations, "a, b");
        assert_eq!(events[2].operations, "b");

        tracker.unsubscribe(id);
        tracker.stop("b");
        assert_eq!(seen.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_panicking_subscriber_does_not_block_others() {
        let tracker = LoadingTracker::new();
        tracker.subscribe(|_| panic!("bad subscriber"));
        let seen = Arc::new(Mutex::new(0u32));
        let seen_clone = Arc::clone(&seen);
        tracker.subscribe(move |_| {
            *seen_clone.lock().unwrap() += 1;
        });

        tracker.start("op", None);
        assert_eq!(*seen.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_with_loading_pairs_on_success() {
        let tracker = LoadingTracker::new();
        let result = tracker
            .with_loading("op", async { Ok::<_, String>(42) })
            .await;
        assert_eq!(result, Ok(42));
        assert!(!tracker.is_loading("op"));
    }

    #[tokio::test]
    async fn test_with_loading_pairs_on_failure() {
        let tracker = LoadingTracker::new();
        let result = tracker
            .with_loading("op", async { Err::<i32, _>("boom".to_string()) })
            .await;
        assert_eq!(result, Err("boom".to_string()));
        assert!(!tracker.is_loading("op"));
    }

    #[tokio::test]
    async fn test_with_loading_clears_slot_when_future_panics() {
        let tracker = Arc::new(LoadingTracker::new());
        let task_tracker = Arc::clone(&tracker);
        let task = tokio::spawn(async move {
            task_tracker
                .with_loading("op", async {
                    if true {
                        panic!("boom");
                    }
                    Ok::<(), String>(())
                })
                .await
        });

        assert!(task.await.is_err());
        assert!(!tracker.is_loading("op")); // unwind still cleared the slot
    }

    #[tokio::test]
    async fn test_with_loading_clears_slot_when_dropped_mid_await() {
        let tracker = LoadingTracker::new();
        let tracked = tracker.with_loading("op", std::future::pending::<Result<(), String>>());

        // Losing the race drops the tracked future mid-await.
        let raced = tokio::time::timeout(std::time::Duration::from_millis(20), tracked).await;
        assert!(raced.is_err());
        assert!(!tracker.is_loading("op"));
    }

    #[tokio::test]
    async fn test_with_loading_is_observable_mid_flight() {
        let tracker = Arc::new(LoadingTracker::new());
        let inner = Arc::clone(&tracker);
        let result = tracker
            .with_loading("op", async move {
                assert!(inner.is_loading("op"));
                Ok::<_, String>(())
            })
            .await;
        assert_eq!(result, Ok(()));
    }
}
