//! Timer-driven task around [`AnnouncementPipeline`].

use crate::announce::{AnnouncementPipeline, UtteranceSink};
use crate::protocol::DetectionSnapshot;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Feeds snapshots into the pipeline and speaks the moves it finds.
pub struct Announcer {
    pipeline: AnnouncementPipeline,
    sink: Arc<dyn UtteranceSink>,
}

impl Announcer {
    pub fn new(pipeline: AnnouncementPipeline, sink: Arc<dyn UtteranceSink>) -> Self {
        Self { pipeline, sink }
    }

    /// Run until `cancel` fires or the snapshot channel closes.
    ///
    /// A diff cycle still pending at that point is dropped.
    pub fn spawn(
        self,
        snapshots: mpsc::UnboundedReceiver<DetectionSnapshot>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(snapshots, cancel))
    }

    async fn run(
        mut self,
        mut snapshots: mpsc::UnboundedReceiver<DetectionSnapshot>,
        cancel: CancellationToken,
    ) {
        loop {
            let deadline = self.pipeline.deadline();
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                snapshot = snapshots.recv() => match snapshot {
                    Some(snapshot) => self.pipeline.notify(snapshot, Instant::now()),
                    None => break,
                },
                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    self.announce_due();
                }
            }
        }

        if self.pipeline.has_pending() {
            debug!("dropping pending announcement cycle on shutdown");
        }
        debug!("announcer stopped");
    }

    fn announce_due(&mut self) {
        for announcement in self.pipeline.poll(Instant::now()) {
            info!(%announcement, "move detected");
            self.sink.submit(announcement.to_string());
        }
    }
}
