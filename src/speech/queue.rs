//! Serialized, non-overlapping playback of utterances.

use crate::announce::UtteranceSink;
use crate::speech::synthesizer::SpeechSynthesizer;
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

#[derive(Debug, Default)]
struct PlaybackState {
    /// Set only by the worker, for the duration of one utterance.
    speaking: AtomicBool,
    /// Accepted but not yet started.
    pending: AtomicUsize,
}

struct Worker {
    utterances: Sender<String>,
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Process-wide speech queue.
///
/// Utterances play one at a time in submission order on a dedicated thread.
/// Producers only enqueue; playback state is owned by the worker. Without a
/// synthesizer every `speak` is a no-op.
pub struct SpeechQueue {
    state: Arc<PlaybackState>,
    worker: Mutex<Option<Worker>>,
    backend: String,
}

impl SpeechQueue {
    /// Start the playback thread for `synthesizer`.
    pub fn new(mut synthesizer: Box<dyn SpeechSynthesizer>) -> Self {
        let state = Arc::new(PlaybackState::default());
        let backend = synthesizer.name().to_string();
        let (utterances, utterance_rx) = unbounded::<String>();
        let (stop, stop_rx) = crossbeam_channel::bounded::<()>(1);

        let worker_state = Arc::clone(&state);
        let handle = thread::spawn(move || {
            Self::run_worker(synthesizer.as_mut(), &utterance_rx, &stop_rx, &worker_state);
        });

        info!(%backend, "speech queue started");
        Self {
            state,
            worker: Mutex::new(Some(Worker {
                utterances,
                stop,
                handle,
            })),
            backend,
        }
    }

    /// A queue that accepts utterances and discards them.
    pub fn unavailable() -> Self {
        Self {
            state: Arc::new(PlaybackState::default()),
            worker: Mutex::new(None),
            backend: "none".to_string(),
        }
    }

    /// Queue with `synthesizer` if there is one, otherwise an unavailable queue.
    pub fn from_synthesizer(synthesizer: Option<Box<dyn SpeechSynthesizer>>) -> Self {
        synthesizer.map_or_else(Self::unavailable, Self::new)
    }

    fn run_worker(
        synthesizer: &mut dyn SpeechSynthesizer,
        utterances: &Receiver<String>,
        stop: &Receiver<()>,
        state: &PlaybackState,
    ) {
        loop {
            crossbeam_channel::select! {
                recv(stop) -> _ => break,
                recv(utterances) -> utterance => {
                    let Ok(text) = utterance else { break };
                    state.speaking.store(true, Ordering::SeqCst);
                    state.pending.fetch_sub(1, Ordering::SeqCst);

                    debug!(%text, "speaking");
                    if let Err(e) = synthesizer.speak(&text) {
                        warn!(error = %e, %text, "speech playback failed");
                    }
                    state.speaking.store(false, Ordering::SeqCst);
                }
            }
        }

        let dropped = utterances.try_iter().count();
        if dropped > 0 {
            debug!(dropped, "discarding queued utterances on shutdown");
        }
        debug!("speech worker stopped");
    }

    /// Append `text` to the queue. Returns immediately.
    pub fn speak(&self, text: impl Into<String>) {
        let text = text.into();
        let guard = self.worker.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(worker) = guard.as_ref() else {
            debug!(%text, "speech unavailable, dropping utterance");
            return;
        };

        self.state.pending.fetch_add(1, Ordering::SeqCst);
        if worker.utterances.send(text).is_err() {
            self.state.pending.fetch_sub(1, Ordering::SeqCst);
            debug!("speech worker gone, dropping utterance");
        }
    }

    pub fn is_speaking(&self) -> bool {
        self.state.speaking.load(Ordering::SeqCst)
    }

    /// Utterances waiting behind the one being spoken.
    pub fn pending(&self) -> usize {
        self.state.pending.load(Ordering::SeqCst)
    }

    /// Nothing playing and nothing queued.
    pub fn is_idle(&self) -> bool {
        self.pending() == 0 && !self.is_speaking()
    }

    pub fn is_available(&self) -> bool {
        self.worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    /// Stop the worker after the utterance in progress; queued ones are dropped.
    ///
    /// Blocks until the worker thread exits. Further `speak` calls are no-ops.
    pub fn shutdown(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        if worker.stop.send(()).is_err() {
            debug!("speech worker already stopped");
        }
        drop(worker.utterances);
        if worker.handle.join().is_err() {
            warn!("speech worker thread panicked");
        }
        info!("speech queue stopped");
    }
}

impl Drop for SpeechQueue {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl UtteranceSink for SpeechQueue {
    fn submit(&self, text: String) {
        self.speak(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::speech::synthesizer::{PlaybackEvent, RecordingSynthesizer};
    use std::time::{Duration, Instant};

    fn wait_idle(queue: &SpeechQueue) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !queue.is_idle() {
            assert!(Instant::now() < deadline, "speech queue did not drain");
            thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_fifo_without_overlap() {
        let synth = RecordingSynthesizer::new().with_duration(Duration::from_millis(30));
        let queue = SpeechQueue::new(Box::new(synth.clone()));

        queue.speak("A");
        queue.speak("B");
        queue.speak("C");
        wait_idle(&queue);

        assert_eq!(
            synth.events(),
            vec![
                PlaybackEvent::Started("A".to_string()),
                PlaybackEvent::Finished("A".to_string()),
                PlaybackEvent::Started("B".to_string()),
                PlaybackEvent::Finished("B".to_string()),
                PlaybackEvent::Started("C".to_string()),
                PlaybackEvent::Finished("C".to_string()),
            ]
        );
    }

    #[test]
    fn test_speak_while_busy_is_queued() {
        let synth = RecordingSynthesizer::new().with_duration(Duration::from_millis(100));
        let queue = SpeechQueue::new(Box::new(synth.clone()));

        queue.speak("first");
        let deadline = Instant::now() + Duration::from_secs(5);
        while !queue.is_speaking() {
            assert!(Instant::now() < deadline, "playback never started");
            thread::sleep(Duration::from_millis(1));
        }

        queue.speak("second");
        assert!(queue.is_speaking());
        assert_eq!(queue.pending(), 1);

        wait_idle(&queue);
        assert_eq!(synth.spoken(), vec!["first", "second"]);
    }

    #[test]
    fn test_playback_failure_does_not_stop_queue() {
        let synth = RecordingSynthesizer::new().with_failure_on("broken");
        let queue = SpeechQueue::new(Box::new(synth.clone()));

        queue.speak("broken");
        queue.speak("fine");
        wait_idle(&queue);

        assert_eq!(synth.spoken(), vec!["fine"]);
    }

    #[test]
    fn test_unavailable_queue_is_noop() {
        let queue = SpeechQueue::unavailable();
        queue.speak("nobody hears this");

        assert!(!queue.is_available());
        assert!(queue.is_idle());
        assert_eq!(queue.backend(), "none");
    }

    #[test]
    fn test_shutdown_stops_worker_and_ignores_later_speech() {
        let synth = RecordingSynthesizer::new();
        let queue = SpeechQueue::new(Box::new(synth.clone()));
        queue.speak("before");
        wait_idle(&queue);

        queue.shutdown();
        queue.speak("after");
        queue.shutdown();

        assert!(!queue.is_available());
        assert_eq!(synth.spoken(), vec!["before"]);
    }

    #[test]
    fn test_utterance_sink_enqueues() {
        let synth = RecordingSynthesizer::new();
        let queue = Arc::new(SpeechQueue::new(Box::new(synth.clone())));
        let sink: Arc<dyn UtteranceSink> = queue.clone();

        sink.submit("P1 moved from e2 to e4".to_string());
        wait_idle(&queue);

        assert_eq!(synth.spoken(), vec!["P1 moved from e2 to e4"]);
    }
}
