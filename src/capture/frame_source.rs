//! Fixed-rate capture loop gated on the connection state.

use crate::capture::{Camera, FrameSink};
use crate::connection::ConnectionState;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Captures one frame per tick while the link is connected.
pub struct FrameSource {
    camera: Box<dyn Camera>,
    interval: Duration,
    consecutive_failures: u32,
}

impl FrameSource {
    pub fn new(camera: Box<dyn Camera>, interval: Duration) -> Self {
        Self {
            camera,
            interval,
            consecutive_failures: 0,
        }
    }

    /// Run the capture loop in the background until `cancel` fires or the
    /// state channel closes.
    ///
    /// Capture starts on the first tick after the state turns `Connected` and
    /// stops as soon as it turns `Disconnected`.
    pub fn spawn(
        self,
        state: watch::Receiver<ConnectionState>,
        sink: Arc<dyn FrameSink>,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(self.run(state, sink, cancel))
    }

    async fn run(
        mut self,
        mut state: watch::Receiver<ConnectionState>,
        sink: Arc<dyn FrameSink>,
        cancel: CancellationToken,
    ) {
        debug!(camera = self.camera.name(), interval = ?self.interval, "frame source ready");

        'outer: loop {
            while !state.borrow_and_update().is_connected() {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'outer,
                    changed = state.changed() => {
                        if changed.is_err() {
                            break 'outer;
                        }
                    }
                }
            }

            info!(camera = self.camera.name(), "frame capture started");
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break 'outer,
                    changed = state.changed() => {
                        if changed.is_err() {
                            break 'outer;
                        }
                        if !state.borrow_and_update().is_connected() {
                            break;
                        }
                    }
                    _ = ticker.tick() => self.capture_once(sink.as_ref()),
                }
            }
            info!("frame capture paused");
        }

        debug!("frame source stopped");
    }

    fn capture_once(&mut self, sink: &dyn FrameSink) {
        match self.camera.capture() {
            Ok(Some(image)) => {
                self.consecutive_failures = 0;
                match image.payload() {
                    Some(payload) => {
                        if !sink.send_frame(payload) {
                            trace!("frame dropped by sink");
                        }
                    }
                    None => trace!("captured image has no payload, skipping"),
                }
            }
            Ok(None) => trace!("no frame available, skipping"),
            Err(e) => {
                self.consecutive_failures = self.consecutive_failures.saturating_add(1);
                if self.consecutive_failures == 1 {
                    warn!(error = %e, "frame capture failed");
                } else {
                    debug!(error = %e, failures = self.consecutive_failures, "frame capture still failing");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{EncodedImage, MockCamera};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        frames: Mutex<Vec<String>>,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.frames.lock().unwrap().len()
        }
    }

    impl FrameSink for RecordingSink {
        fn send_frame(&self, payload: String) -> bool {
            self.frames.lock().unwrap().push(payload);
            true
        }
    }

    const INTERVAL: Duration = Duration::from_millis(100);

    fn start(
        camera: MockCamera,
    ) -> (
        watch::Sender<ConnectionState>,
        Arc<RecordingSink>,
        CancellationToken,
        JoinHandle<()>,
    ) {
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let sink = Arc::new(RecordingSink::default());
        let cancel = CancellationToken::new();
        let task = FrameSource::new(Box::new(camera), INTERVAL).spawn(
            state_rx,
            sink.clone(),
            cancel.clone(),
        );
        (state_tx, sink, cancel, task)
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_capture_while_disconnected() {
        let camera = MockCamera::new();
        let counter = camera.capture_counter();
        let (_state, sink, cancel, task) = start(camera);

        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(sink.count(), 0);
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 0);
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_captures_at_fixed_rate_while_connected() {
        let (state, sink, cancel, task) = start(MockCamera::new());

        state.send(ConnectionState::Connected).unwrap();
        // First tick fires immediately, then every 100ms.
        tokio::time::sleep(Duration::from_millis(950)).await;

        assert_eq!(sink.count(), 10);
        assert!(
            sink.frames
                .lock()
                .unwrap()
                .iter()
                .all(|frame| frame == "/9j/4AAQSkZJRg==")
        );

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_capture_stops_on_disconnect_and_resumes() {
        let (state, sink, cancel, task) = start(MockCamera::new());

        state.send(ConnectionState::Connected).unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        let while_connected = sink.count();
        assert_eq!(while_connected, 3);

        state.send(ConnectionState::Disconnected).unwrap();
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(sink.count(), while_connected);

        state.send(ConnectionState::Connected).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(sink.count(), while_connected + 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_and_failed_captures_are_skipped() {
        let camera = MockCamera::new()
            .then_not_ready()
            .then_failure()
            .then_frame(EncodedImage::DataUrl("data:,".to_string()))
            .then_frame(EncodedImage::Jpeg(vec![0xff, 0xd8, 0xff]));
        let (state, sink, cancel, task) = start(camera);

        state.send(ConnectionState::Connected).unwrap();
        tokio::time::sleep(Duration::from_millis(350)).await;

        assert_eq!(sink.frames.lock().unwrap().as_slice(), ["/9j/"]);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_state_channel_closes() {
        let (state, _sink, _cancel, task) = start(MockCamera::new());
        state.send(ConnectionState::Connected).unwrap();
        drop(state);

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .expect("frame source did not stop")
            .unwrap();
    }
}
