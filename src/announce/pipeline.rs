//! Debounced diffing of detection snapshots.

use crate::announce::{MoveAnnouncement, diff_moves};
use crate::protocol::DetectionSnapshot;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug)]
struct Pending {
    snapshot: DetectionSnapshot,
    deadline: Instant,
}

/// Coalesces bursts of snapshots into at most one diff cycle per settling window.
///
/// Each [`notify`](Self::notify) replaces the pending snapshot and pushes the
/// deadline out to `now + window`. Once the deadline passes,
/// [`poll`](Self::poll) diffs the pending snapshot against the last committed
/// one and commits it. The pipeline keeps no clock of its own; callers pass
/// the current instant in.
#[derive(Debug)]
pub struct AnnouncementPipeline {
    window: Duration,
    max_wait: Option<Duration>,
    committed: DetectionSnapshot,
    pending: Option<Pending>,
    /// When the current burst began, for the max-wait bound.
    burst_start: Option<Instant>,
}

impl AnnouncementPipeline {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            max_wait: None,
            committed: DetectionSnapshot::default(),
            pending: None,
            burst_start: None,
        }
    }

    /// Bound how long a continuous burst may postpone the diff cycle.
    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Record a new snapshot.
    pub fn notify(&mut self, snapshot: DetectionSnapshot, now: Instant) {
        let burst_start = *self.burst_start.get_or_insert(now);
        let mut deadline = now + self.window;
        if let Some(max_wait) = self.max_wait {
            deadline = deadline.min(burst_start + max_wait);
        }
        self.pending = Some(Pending { snapshot, deadline });
    }

    /// When the pending diff cycle becomes due, if one is pending.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|pending| pending.deadline)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Run the diff cycle if it is due.
    ///
    /// Returns the moves found, or nothing if no cycle ran. The committed
    /// snapshot advances only when a cycle runs.
    pub fn poll(&mut self, now: Instant) -> Vec<MoveAnnouncement> {
        match self.pending.take() {
            Some(pending) if pending.deadline <= now => {
                self.burst_start = None;
                let moves = diff_moves(&self.committed, &pending.snapshot);
                self.committed = pending.snapshot;
                moves
            }
            not_due => {
                self.pending = not_due;
                Vec::new()
            }
        }
    }

    /// Snapshot the next diff cycle compares against.
    pub fn committed(&self) -> &DetectionSnapshot {
        &self.committed
    }
}
