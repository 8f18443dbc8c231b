use crate::Generation;
use std::sync::Arc;
use strum_macros::{AsRefStr, Display};
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, AsRefStr, Display)]
pub enum ProcessingState {
    #[default]
    Idle,
    Loading,
    Running,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RunProgress {
    pub generation: Generation,
    pub state: ProcessingState,
    pub processed: usize,
    pub failed: usize,
    pub total: usize,
}

impl RunProgress {
    pub fn status_text(&self) -> String {
        format!("{}/{} Images Processed", self.processed, self.total)
    }

    pub fn is_completed(&self) -> bool {
        self.state == ProcessingState::Completed
    }
}

/// Progress of the current run, observable through a `watch` channel.
/// Updates carrying an outdated generation are dropped.
#[derive(Clone)]
pub struct ProgressTracker {
    tx: Arc<watch::Sender<RunProgress>>,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RunProgress::default());
        Self { tx: Arc::new(tx) }
    }

    pub fn subscribe(&self) -> watch::Receiver<RunProgress> {
        self.tx.subscribe()
    }

    pub fn snapshot(&self) -> RunProgress {
        self.tx.borrow().clone()
    }

    pub fn reset(&self, generation: Generation, total: usize) {
        self.tx.send_replace(RunProgress {
            generation,
            total,
            ..Default::default()
        });
    }

    pub fn set_state(&self, generation: Generation, state: ProcessingState) -> bool {
        self.tx.send_if_modified(|progress| {
            if progress.generation != generation || progress.state == state {
                return false;
            }
            progress.state = state;
            true
        })
    }

    /// Count one finished image.
    pub fn record(&self, generation: Generation, failed: bool) -> bool {
        self.tx.send_if_modified(|progress| {
            if progress.generation != generation {
                return false;
            }
            progress.processed += 1;
            if failed {
                progress.failed += 1;
            }
            true
        })
    }
}

#[cfg(test)]
mod test {
    use super::{ProcessingState, ProgressTracker};

    #[test]
    fn test_status_text() {
        let tracker = ProgressTracker::new();
        assert_eq!(tracker.snapshot().status_text(), "0/0 Images Processed");

        tracker.reset(1, 2);
        assert!(tracker.record(1, false));
        assert!(tracker.record(1, true));
        let progress = tracker.snapshot();
        assert_eq!(progress.status_text(), "2/2 Images Processed");
        assert_eq!(progress.failed, 1);
    }

    #[test]
    fn test_stale_generation_ignored() {
        let tracker = ProgressTracker::new();
        tracker.reset(1, 3);
        tracker.reset(2, 1);

        assert!(!tracker.record(1, false));
        assert!(!tracker.set_state(1, ProcessingState::Completed));
        assert_eq!(tracker.snapshot().processed, 0);
        assert_eq!(tracker.snapshot().state, ProcessingState::Idle);

        assert!(tracker.set_state(2, ProcessingState::Running));
        assert_eq!(tracker.snapshot().state, ProcessingState::Running);
    }

    #[test_log::test(tokio::test)]
    async fn test_subscriber_sees_completion() {
        let tracker = ProgressTracker::new();
        let mut rx = tracker.subscribe();
        tracker.reset(7, 1);

        let writer = tracker.clone();
        tokio::spawn(async move {
            writer.set_state(7, ProcessingState::Running);
            writer.record(7, false);
            writer.set_state(7, ProcessingState::Completed);
        });

        let progress = rx.wait_for(|v| v.is_completed()).await.unwrap().clone();
        assert_eq!(progress.processed, 1);
        assert_eq!(progress.generation, 7);
    }
}
