//! Composition root: wires the link, frame capture, announcements and speech.

use crate::announce::{AnnouncementPipeline, Announcer, UtteranceSink};
use crate::capture::{Camera, FrameSink, FrameSource, IdleCamera, ImageDirCamera};
use crate::config::Config;
use crate::connection::{
    ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionSettings, ConnectionState,
    Connector, WebSocketConnector,
};
use crate::defaults;
use crate::error::{Result, VisionError};
use crate::protocol::DetectionSnapshot;
use crate::speech::{SpeechQueue, SystemCommandExecutor, synthesizer_from_config};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Running client.
///
/// Exposes the connection state and the latest detections as read-only
/// observable state for a presentation layer.
pub struct Coordinator {
    connection: ConnectionManager,
    handle: ConnectionHandle,
    speech: Arc<SpeechQueue>,
    cancel: CancellationToken,
    frame_task: JoinHandle<()>,
    announcer_task: JoinHandle<()>,
    event_task: JoinHandle<()>,
}

impl Coordinator {
    /// Start every component. Must be called from within a tokio runtime.
    ///
    /// # Arguments
    /// * `config` - Validated configuration
    /// * `connector` - Opens links to the detection service
    /// * `camera` - Source of frames sent while connected
    /// * `speech` - Shared queue for notices and move announcements
    pub fn start(
        config: &Config,
        connector: Arc<dyn Connector>,
        camera: Box<dyn Camera>,
        speech: Arc<SpeechQueue>,
    ) -> Self {
        let cancel = CancellationToken::new();

        let (connection, events) =
            ConnectionManager::start(ConnectionSettings::from(&config.connection), connector);
        let handle = connection.handle();

        let frame_sink: Arc<dyn FrameSink> = Arc::new(handle.clone());
        let frame_task = FrameSource::new(camera, config.capture.frame_interval()).spawn(
            handle.subscribe_state(),
            frame_sink,
            cancel.child_token(),
        );

        let (snapshots_tx, snapshots_rx) = mpsc::unbounded_channel();
        let pipeline = AnnouncementPipeline::new(config.announce.window())
            .with_max_wait(config.announce.max_wait());
        let utterances: Arc<dyn UtteranceSink> = speech.clone();
        let announcer_task = Announcer::new(pipeline, utterances).spawn(snapshots_rx, cancel.child_token());

        let event_task = tokio::spawn(route_events(
            events,
            snapshots_tx,
            Arc::clone(&speech),
            cancel.child_token(),
        ));

        info!(endpoint = %config.connection.endpoint, "chess vision client started");

        Self {
            connection,
            handle,
            speech,
            cancel,
            frame_task,
            announcer_task,
            event_task,
        }
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.handle.subscribe_state()
    }

    pub fn latest_detections(&self) -> watch::Receiver<DetectionSnapshot> {
        self.handle.subscribe_detections()
    }

    pub fn handle(&self) -> ConnectionHandle {
        self.handle.clone()
    }

    /// Tear down in order: connection, frame source, announcer, speech.
    pub async fn shutdown(self) {
        let stats = self.handle.stats();
        self.connection.close().await;
        self.cancel.cancel();

        for (name, task) in [
            ("frame source", self.frame_task),
            ("announcer", self.announcer_task),
            ("event router", self.event_task),
        ] {
            if let Err(e) = task.await {
                error!("{name} task failed: {e}");
            }
        }

        let speech = self.speech;
        if let Err(e) = tokio::task::spawn_blocking(move || speech.shutdown()).await {
            error!("speech shutdown failed: {e}");
        }

        info!(
            frames_sent = stats.frames_sent,
            frames_dropped = stats.frames_dropped,
            malformed_messages = stats.malformed_messages,
            connect_attempts = stats.connect_attempts,
            "chess vision client stopped"
        );
    }
}

/// Turn connection events into spoken notices and announcer input.
async fn route_events(
    mut events: mpsc::UnboundedReceiver<ConnectionEvent>,
    snapshots: mpsc::UnboundedSender<DetectionSnapshot>,
    speech: Arc<SpeechQueue>,
    cancel: CancellationToken,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        match event {
            ConnectionEvent::Connected => speech.speak(defaults::CONNECTED_NOTICE),
            ConnectionEvent::Disconnected { .. } => speech.speak(defaults::DISCONNECTED_NOTICE),
            ConnectionEvent::Detections(snapshot) => {
                if snapshots.send(snapshot).is_err() {
                    debug!("announcer gone, dropping snapshot");
                }
            }
        }
    }
    debug!("event router stopped");
}

/// Build the camera selected by `config`.
///
/// # Errors
/// Returns `VisionError::Capture` if the configured image directory is unreadable.
pub fn camera_from_config(config: &Config) -> Result<Box<dyn Camera>> {
    match &config.capture.image_dir {
        Some(dir) => Ok(Box::new(ImageDirCamera::open(dir)?)),
        None => {
            warn!("no image source configured; no frames will be sent");
            Ok(Box::new(IdleCamera))
        }
    }
}

/// Run the client against the configured endpoint until SIGINT or SIGTERM.
pub async fn run_client(config: Config) -> Result<()> {
    config.validate()?;

    let camera = camera_from_config(&config)?;
    let synthesizer = synthesizer_from_config(&config.speech, SystemCommandExecutor::new())?;
    let speech = Arc::new(SpeechQueue::from_synthesizer(synthesizer));

    let coordinator = Coordinator::start(&config, Arc::new(WebSocketConnector), camera, speech);

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            match res {
                Ok(()) => info!("received SIGINT, shutting down"),
                Err(e) => error!("failed to listen for SIGINT, shutting down: {e}"),
            }
        }
        res = wait_for_sigterm() => {
            if let Err(e) = res {
                error!("error setting up signal handler: {e}");
            }
            info!("received SIGTERM, shutting down");
        }
    }

    coordinator.shutdown().await;
    Ok(())
}

/// Wait for SIGTERM signal (used by service managers).
#[cfg(unix)]
async fn wait_for_sigterm() -> Result<()> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| VisionError::Other(format!("Failed to register SIGTERM handler: {}", e)))?;
    sigterm.recv().await;
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_sigterm() -> Result<()> {
    std::future::pending::<()>().await;
    Ok(())
}
