use crate::defaults;
use crate::error::{Result, VisionError};
use crate::speech::SpeechChoice;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub capture: CaptureConfig,
    pub announce: AnnounceConfig,
    pub speech: SpeechConfig,
}

/// Link to the detection service
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConnectionConfig {
    pub endpoint: String,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub connect_timeout_ms: u64,
}

/// Frame capture configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub frames_per_second: u32,
    /// Directory of JPEG stills replayed in place of a live camera.
    pub image_dir: Option<PathBuf>,
}

/// Move announcement configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnnounceConfig {
    pub debounce_ms: u64,
    /// Longest a continuous stream of snapshots may postpone a diff cycle.
    pub max_wait_ms: Option<u64>,
}

/// Speech output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SpeechConfig {
    /// One of `auto`, `espeak-ng`, `spd-say`, `say`, `none`.
    pub backend: String,
    /// Speaking rate in words per minute, passed through to the tool.
    pub rate: Option<u32>,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            endpoint: defaults::ENDPOINT.to_string(),
            base_delay_ms: defaults::BASE_RECONNECT_DELAY_MS,
            max_delay_ms: defaults::MAX_RECONNECT_DELAY_MS,
            connect_timeout_ms: defaults::CONNECT_TIMEOUT_MS,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            frames_per_second: defaults::FRAMES_PER_SECOND,
            image_dir: None,
        }
    }
}

impl Default for AnnounceConfig {
    fn default() -> Self {
        Self {
            debounce_ms: defaults::DEBOUNCE_MS,
            max_wait_ms: None,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            backend: defaults::AUTO_SPEECH_BACKEND.to_string(),
            rate: None,
        }
    }
}

impl ConnectionConfig {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl CaptureConfig {
    /// Time between two captures.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frames_per_second.max(1)
    }
}

impl AnnounceConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn max_wait(&self) -> Option<Duration> {
        self.max_wait_ms.map(Duration::from_millis)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Missing fields use default values.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VisionError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
            } else {
                VisionError::Io(e)
            }
        })?;
        let config: Config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from a file or return defaults if the file doesn't exist
    ///
    /// Invalid TOML is still an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        match Self::load(path) {
            Err(VisionError::ConfigFileNotFound { .. }) => Ok(Self::default()),
            other => other,
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - CHESS_VISION_ENDPOINT → connection.endpoint
    /// - CHESS_VISION_IMAGE_DIR → capture.image_dir
    /// - CHESS_VISION_SPEECH_BACKEND → speech.backend
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = std::env::var("CHESS_VISION_ENDPOINT")
            && !endpoint.is_empty()
        {
            self.connection.endpoint = endpoint;
        }

        if let Ok(dir) = std::env::var("CHESS_VISION_IMAGE_DIR")
            && !dir.is_empty()
        {
            self.capture.image_dir = Some(PathBuf::from(dir));
        }

        if let Ok(backend) = std::env::var("CHESS_VISION_SPEECH_BACKEND")
            && !backend.is_empty()
        {
            self.speech.backend = backend;
        }

        self
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> Result<()> {
        let endpoint = &self.connection.endpoint;
        if !(endpoint.starts_with("ws://") || endpoint.starts_with("wss://")) {
            return Err(invalid(
                "connection.endpoint",
                format!("expected a ws:// or wss:// URL, got '{endpoint}'"),
            ));
        }
        if self.connection.base_delay_ms == 0 {
            return Err(invalid("connection.base_delay_ms", "must be positive"));
        }
        if self.connection.max_delay_ms < self.connection.base_delay_ms {
            return Err(invalid(
                "connection.max_delay_ms",
                "must not be smaller than connection.base_delay_ms",
            ));
        }
        if self.connection.connect_timeout_ms == 0 {
            return Err(invalid("connection.connect_timeout_ms", "must be positive"));
        }
        if self.capture.frames_per_second == 0 {
            return Err(invalid("capture.frames_per_second", "must be positive"));
        }
        if self.announce.debounce_ms == 0 {
            return Err(invalid("announce.debounce_ms", "must be positive"));
        }
        if let Some(max_wait) = self.announce.max_wait_ms
            && max_wait < self.announce.debounce_ms
        {
            return Err(invalid(
                "announce.max_wait_ms",
                "must not be smaller than announce.debounce_ms",
            ));
        }
        self.speech.backend.parse::<SpeechChoice>()?;
        Ok(())
    }

    /// Get the default configuration file path
    ///
    /// Returns ~/.config/chess-vision/config.toml on Linux
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("chess-vision").join("config.toml"))
            .ok_or_else(|| VisionError::Other("Could not determine config directory".to_string()))
    }

    /// Render the configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| VisionError::ConfigParse {
            message: e.to_string(),
        })
    }
}

fn invalid(key: &str, message: impl Into<String>) -> VisionError {
    VisionError::ConfigInvalidValue {
        key: key.to_string(),
        message: message.into(),
    }
}
