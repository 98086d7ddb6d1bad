//! Error types for chess-vision.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum VisionError {
    // Configuration errors
    #[error("Configuration file not found at {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Link errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Connection attempt timed out after {timeout_ms}ms")]
    ConnectTimeout { timeout_ms: u64 },

    #[error("Malformed message: {message}")]
    MalformedMessage { message: String },

    // Camera errors
    #[error("Frame capture failed: {message}")]
    Capture { message: String },

    // Speech errors
    #[error("Speech tool not found: {tool}")]
    SpeechToolNotFound { tool: String },

    #[error("Speech synthesis failed: {message}")]
    SpeechFailed { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl VisionError {
    /// True for errors that end the current link session.
    ///
    /// Malformed inbound payloads are reported but leave the link open.
    pub fn is_link_fatal(&self) -> bool {
        !matches!(self, VisionError::MalformedMessage { .. })
    }
}

pub type Result<T> = std::result::Result<T, VisionError>;
