//! Progress notification fan-out.
//!
//! [`ProgressSubject`] delivers lifecycle events to every registered
//! [`ProgressObserver`]. A failing observer (error or panic) is logged and
//! skipped; the remaining observers still receive the event and later events
//! are delivered as usual. Nothing an observer does can change pipeline state.

use std::collections::hash_map::RandomState;
use std::collections::HashMap;
use std::hash::BuildHasher;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use thiserror::Error;

/// Raised inside an observer callback. Never propagated past the subject.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Observer '{observer}' failed: {reason}")]
pub struct ObserverError {
    pub observer: String,
    pub reason: String,
}

impl ObserverError {
    pub fn new(observer: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            observer: observer.into(),
            reason: reason.into(),
        }
    }
}

/// Sink for document lifecycle events. All callbacks default to no-ops.
pub trait ProgressObserver: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_started(&self, _document_id: &str) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_progress(&self, _document_id: &str, _stage: &str, _progress: u8) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_completed(&self, _document_id: &str, _success: bool) -> Result<(), ObserverError> {
        Ok(())
    }

    fn on_error(&self, _document_id: &str, _error: &str) -> Result<(), ObserverError> {
        Ok(())
    }
}

/// Handle returned by [`ProgressSubject::add_observer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

// ═══════════════════════════════════════════════════════════
// Subject
// ═══════════════════════════════════════════════════════════

#[derive(Default)]
pub struct ProgressSubject {
    observers: RwLock<Vec<(ObserverId, Arc<dyn ProgressObserver>)>>,
    next_id: AtomicU64,
}

impl ProgressSubject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_observer(&self, observer: Arc<dyn ProgressObserver>) -> ObserverId {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, observer));
        id
    }

    /// Returns whether an observer was registered under `id`.
    pub fn remove_observer(&self, id: ObserverId) -> bool {
        let mut observers = self.observers.write().unwrap_or_else(PoisonError::into_inner);
        let before = observers.len();
        observers.retain(|(oid, _)| *oid != id);
        observers.len() != before
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn notify_started(&self, document_id: &str) -> Vec<ObserverError> {
        self.fan_out("started", document_id, |o| o.on_started(document_id))
    }

    pub fn notify_progress(&self, document_id: &str, stage: &str, progress: u8) -> Vec<ObserverError> {
        self.fan_out("progress", document_id, |o| {
            o.on_progress(document_id, stage, progress)
        })
    }

    pub fn notify_completed(&self, document_id: &str, success: bool) -> Vec<ObserverError> {
        self.fan_out("completed", document_id, |o| {
            o.on_completed(document_id, success)
        })
    }

    pub fn notify_error(&self, document_id: &str, error: &str) -> Vec<ObserverError> {
        self.fan_out("error", document_id, |o| o.on_error(document_id, error))
    }

    /// Deliver to every observer, collecting failures instead of stopping.
    fn fan_out<F>(&self, event: &'static str, document_id: &str, deliver: F) -> Vec<ObserverError>
    where
        F: Fn(&dyn ProgressObserver) -> Result<(), ObserverError>,
    {
        // Snapshot so callbacks may add/remove observers without deadlocking.
        let observers: Vec<Arc<dyn ProgressObserver>> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, o)| o.clone())
            .collect();

        let mut failures = Vec::new();
        for observer in observers {
            let outcome = catch_unwind(AssertUnwindSafe(|| deliver(observer.as_ref())))
                .unwrap_or_else(|_| Err(ObserverError::new(observer.name(), "observer panicked")));
            if let Err(e) = outcome {
                tracing::warn!(
                    document_id,
                    event,
                    observer = observer.name(),
                    error = %e,
                    "Observer notification failed"
                );
                failures.push(e);
            }
        }
        failures
    }
}

// ═══════════════════════════════════════════════════════════
// Progress tracking
// ═══════════════════════════════════════════════════════════

/// Live progress of one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub current_stage: String,
    pub overall_progress: u8,
}

impl Default for ProgressRecord {
    fn default() -> Self {
        Self {
            current_stage: "Not started".to_string(),
            overall_progress: 0,
        }
    }
}

const TRACKER_SHARDS: usize = 16;

/// Keeps a [`ProgressRecord`] per in-flight document.
///
/// Records are created on `started`, updated on `progress`, and dropped on
/// `completed` or `error`. The map is sharded by document id so unrelated
/// documents do not serialize on one lock.
pub struct ProgressTracker {
    shards: Vec<Mutex<HashMap<String, ProgressRecord>>>,
    hasher: RandomState,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self {
            shards: (0..TRACKER_SHARDS).map(|_| Mutex::new(HashMap::new())).collect(),
            hasher: RandomState::new(),
        }
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record for `document_id`, if it is in flight.
    pub fn progress(&self, document_id: &str) -> Option<ProgressRecord> {
        self.shard(document_id).get(document_id).cloned()
    }

    /// Number of documents currently tracked.
    pub fn in_flight(&self) -> usize {
        self.shards
            .iter()
            .map(|s| s.lock().unwrap_or_else(PoisonError::into_inner).len())
            .sum()
    }

    fn shard(&self, document_id: &str) -> MutexGuard<'_, HashMap<String, ProgressRecord>> {
        let idx = (self.hasher.hash_one(document_id) as usize) % self.shards.len();
        self.shards[idx].lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressObserver for ProgressTracker {
    fn name(&self) -> &'static str {
        "progress_tracker"
    }

    fn on_started(&self, document_id: &str) -> Result<(), ObserverError> {
        self.shard(document_id)
            .insert(document_id.to_string(), ProgressRecord::default());
        tracing::debug!(document_id, "Progress tracking started");
        Ok(())
    }

    fn on_progress(&self, document_id: &str, stage: &str, progress: u8) -> Result<(), ObserverError> {
        if let Some(record) = self.shard(document_id).get_mut(document_id) {
            record.current_stage = stage.to_string();
            record.overall_progress = progress.min(100);
        }
        Ok(())
    }

    fn on_completed(&self, document_id: &str, success: bool) -> Result<(), ObserverError> {
        if let Some(record) = self.shard(document_id).remove(document_id) {
            tracing::debug!(
                document_id,
                success,
                final_progress = record.overall_progress,
                "Progress tracking finished"
            );
        }
        Ok(())
    }

    fn on_error(&self, document_id: &str, error: &str) -> Result<(), ObserverError> {
        if let Some(record) = self.shard(document_id).remove(document_id) {
            tracing::debug!(
                document_id,
                error,
                final_progress = record.overall_progress,
                "Progress tracking aborted"
            );
        }
        Ok(())
    }
}

/// Mirrors lifecycle events into the log.
pub struct LoggingObserver;

impl ProgressObserver for LoggingObserver {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn on_started(&self, document_id: &str) -> Result<(), ObserverError> {
        tracing::info!(document_id, "Processing started");
        Ok(())
    }

    fn on_progress(&self, document_id: &str, stage: &str, progress: u8) -> Result<(), ObserverError> {
        tracing::info!(document_id, stage, progress, "Processing progress");
        Ok(())
    }

    fn on_completed(&self, document_id: &str, success: bool) -> Result<(), ObserverError> {
        tracing::info!(document_id, success, "Processing completed");
        Ok(())
    }

    fn on_error(&self, document_id: &str, error: &str) -> Result<(), ObserverError> {
        tracing::warn!(document_id, error, "Processing error");
        Ok(())
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    /// Records every event it sees as a string.
    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<String>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<String> {
            self.events.lock().unwrap().clone()
        }
    }

    impl ProgressObserver for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        fn on_started(&self, id: &str) -> Result<(), ObserverError> {
            self.events.lock().unwrap().push(format!("started:{id}"));
            Ok(())
        }

        fn on_progress(&self, id: &str, stage: &str, pct: u8) -> Result<(), ObserverError> {
            self.events.lock().unwrap().push(format!("progress:{id}:{stage}:{pct}"));
            Ok(())
        }

        fn on_completed(&self, id: &str, success: bool) -> Result<(), ObserverError> {
            self.events.lock().unwrap().push(format!("completed:{id}:{success}"));
            Ok(())
        }

        fn on_error(&self, id: &str, error: &str) -> Result<(), ObserverError> {
            self.events.lock().unwrap().push(format!("error:{id}:{error}"));
            Ok(())
        }
    }

    /// Fails every progress callback.
    struct FailingOnProgress;

    impl ProgressObserver for FailingOnProgress {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn on_progress(&self, _: &str, _: &str, _: u8) -> Result<(), ObserverError> {
            Err(ObserverError::new("failing", "boom"))
        }
    }

    /// Panics on every callback.
    struct Panicking;

    impl ProgressObserver for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }

        fn on_started(&self, _: &str) -> Result<(), ObserverError> {
            panic!("observer bug")
        }
    }

    // ── Fan-out isolation ───────────────────────────────

    #[test]
    fn failing_observer_does_not_block_later_observers() {
        let subject = ProgressSubject::new();
        let recorder = Arc::new(Recorder::default());
        subject.add_observer(Arc::new(FailingOnProgress));
        subject.add_observer(recorder.clone());

        let failures = subject.notify_progress("d1", "VALIDATION", 33);
        assert_eq!(failures, vec![ObserverError::new("failing", "boom")]);
        assert_eq!(recorder.events(), vec!["progress:d1:VALIDATION:33"]);

        // Later events still flow
        let failures = subject.notify_completed("d1", true);
        assert!(failures.is_empty());
        assert_eq!(
            recorder.events(),
            vec!["progress:d1:VALIDATION:33", "completed:d1:true"]
        );
    }

    #[test]
    fn panicking_observer_is_contained() {
        let subject = ProgressSubject::new();
        let recorder = Arc::new(Recorder::default());
        subject.add_observer(Arc::new(Panicking));
        subject.add_observer(recorder.clone());

        let failures = subject.notify_started("d1");
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].observer, "panicking");
        assert_eq!(recorder.events(), vec!["started:d1"]);
    }

    #[test]
    fn observers_receive_events_in_registration_order() {
        let subject = ProgressSubject::new();
        let shared = Arc::new(Recorder::default());
        subject.add_observer(shared.clone());
        subject.add_observer(shared.clone());
        subject.notify_error("d1", "bad");
        assert_eq!(shared.events(), vec!["error:d1:bad", "error:d1:bad"]);
    }

    // ── Registration ────────────────────────────────────

    #[test]
    fn removed_observer_stops_receiving() {
        let subject = ProgressSubject::new();
        let recorder = Arc::new(Recorder::default());
        let id = subject.add_observer(recorder.clone());
        assert_eq!(subject.observer_count(), 1);

        assert!(subject.remove_observer(id));
        assert!(!subject.remove_observer(id));
        subject.notify_started("d1");
        assert!(recorder.events().is_empty());
        assert_eq!(subject.observer_count(), 0);
    }

    // ── Tracker ─────────────────────────────────────────

    #[test]
    fn tracker_lifecycle_on_completion() {
        let tracker = ProgressTracker::new();
        tracker.on_started("d1").unwrap();
        assert_eq!(tracker.progress("d1"), Some(ProgressRecord::default()));

        tracker.on_progress("d1", "EXTRACTION", 66).unwrap();
        assert_eq!(
            tracker.progress("d1"),
            Some(ProgressRecord {
                current_stage: "EXTRACTION".into(),
                overall_progress: 66,
            })
        );

        tracker.on_completed("d1", true).unwrap();
        assert!(tracker.progress("d1").is_none());
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn tracker_drops_record_on_error() {
        let tracker = ProgressTracker::new();
        tracker.on_started("d1").unwrap();
        tracker.on_error("d1", "unreadable").unwrap();
        assert!(tracker.progress("d1").is_none());
        // A trailing completed(false) is harmless
        tracker.on_completed("d1", false).unwrap();
        assert_eq!(tracker.in_flight(), 0);
    }

    #[test]
    fn tracker_ignores_progress_for_unknown_document() {
        let tracker = ProgressTracker::new();
        tracker.on_progress("ghost", "EXTRACTION", 50).unwrap();
        assert!(tracker.progress("ghost").is_none());
    }

    #[test]
    fn tracker_clamps_progress() {
        let tracker = ProgressTracker::new();
        tracker.on_started("d1").unwrap();
        tracker.on_progress("d1", "CATEGORIZATION", 250).unwrap();
        assert_eq!(tracker.progress("d1").unwrap().overall_progress, 100);
    }

    #[test]
    fn tracker_handles_concurrent_documents() {
        let tracker = Arc::new(ProgressTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let tracker = tracker.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        let id = format!("doc-{t}-{i}");
                        tracker.on_started(&id).unwrap();
                        tracker.on_progress(&id, "VALIDATION", 33).unwrap();
                        if i % 2 == 0 {
                            tracker.on_completed(&id, true).unwrap();
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(tracker.in_flight(), 8 * 25);
        assert_eq!(tracker.progress("doc-3-1").unwrap().overall_progress, 33);
        assert!(tracker.progress("doc-3-2").is_none());
    }

    #[test]
    fn tracker_as_observer_through_subject() {
        let subject = ProgressSubject::new();
        let tracker = Arc::new(ProgressTracker::new());
        subject.add_observer(Arc::new(FailingOnProgress));
        subject.add_observer(tracker.clone());

        subject.notify_started("d1");
        subject.notify_progress("d1", "VALIDATION", 33);
        assert_eq!(tracker.progress("d1").unwrap().current_stage, "VALIDATION");
        subject.notify_completed("d1", true);
        assert_eq!(tracker.in_flight(), 0);
    }
}
