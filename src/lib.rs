//! chess-vision - spoken move announcements from a chess vision service
//!
//! Streams board frames to a detection service over a self-healing link,
//! diffs the returned piece positions and announces moves through a
//! serialized speech queue.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod announce;
pub mod capture;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod connection;
pub mod coordinator;
pub mod defaults;
pub mod diagnostics;
pub mod error;
pub mod protocol;
pub mod speech;

// Components
pub use announce::{AnnouncementPipeline, Announcer, MoveAnnouncement, UtteranceSink};
pub use capture::{Camera, EncodedImage, FrameSink, FrameSource};
pub use connection::{
    ConnectionEvent, ConnectionHandle, ConnectionManager, ConnectionSettings, ConnectionState,
    Connector, WebSocketConnector,
};
pub use speech::{SpeechQueue, SpeechSynthesizer};

// Composition root
pub use coordinator::{Coordinator, run_client};

// Wire contract
pub use protocol::{DetectedPiece, DetectionSnapshot};

// Error handling
pub use error::{Result, VisionError};

// Config
pub use config::Config;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when git hash is available, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}
