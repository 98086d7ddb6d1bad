//! Speech synthesis backends.

use crate::config::SpeechConfig;
use crate::error::{Result, VisionError};
use crate::speech::executor::CommandExecutor;
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Speaks text, blocking until playback has finished.
pub trait SpeechSynthesizer: Send {
    /// # Errors
    /// Returns `VisionError::SpeechFailed` when playback could not complete.
    fn speak(&mut self, text: &str) -> Result<()>;

    fn name(&self) -> &str;
}

/// External text-to-speech tools the client can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechBackend {
    EspeakNg,
    /// speech-dispatcher client; `--wait` makes it block until spoken.
    SpdSay,
    /// macOS `say`.
    Say,
}

impl SpeechBackend {
    /// Probe order for auto-detection.
    pub const ALL: [SpeechBackend; 3] = [Self::EspeakNg, Self::SpdSay, Self::Say];

    pub fn command(self) -> &'static str {
        match self {
            Self::EspeakNg => "espeak-ng",
            Self::SpdSay => "spd-say",
            Self::Say => "say",
        }
    }

    /// Arguments of a cheap invocation that succeeds when the tool is usable.
    pub fn probe_args(self) -> &'static [&'static str] {
        match self {
            Self::EspeakNg | Self::SpdSay => &["--version"],
            Self::Say => &["-v", "?"],
        }
    }

    /// Arguments to speak `text` and block until done.
    ///
    /// `rate` is words per minute; spd-say has no such scale and ignores it.
    pub fn speak_args(self, text: &str, rate: Option<u32>) -> Vec<String> {
        let mut args = Vec::new();
        match self {
            Self::EspeakNg => {
                if let Some(rate) = rate {
                    args.extend(["-s".to_string(), rate.to_string()]);
                }
            }
            Self::SpdSay => args.push("--wait".to_string()),
            Self::Say => {
                if let Some(rate) = rate {
                    args.extend(["-r".to_string(), rate.to_string()]);
                }
            }
        }
        args.push(text.to_string());
        args
    }

    /// Whether `executor` can run this backend.
    pub fn is_available(self, executor: &dyn CommandExecutor) -> bool {
        match executor.execute(self.command(), self.probe_args()) {
            Ok(_) => true,
            Err(e) => {
                debug!(backend = self.command(), error = %e, "speech backend unavailable");
                false
            }
        }
    }

    /// First available backend in probe order.
    pub fn detect(executor: &dyn CommandExecutor) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|backend| backend.is_available(executor))
    }
}

impl fmt::Display for SpeechBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// The `speech.backend` setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeechChoice {
    Auto,
    Disabled,
    Backend(SpeechBackend),
}

impl FromStr for SpeechChoice {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "none" | "off" => Ok(Self::Disabled),
            "espeak-ng" | "espeak" => Ok(Self::Backend(SpeechBackend::EspeakNg)),
            "spd-say" | "speech-dispatcher" => Ok(Self::Backend(SpeechBackend::SpdSay)),
            "say" => Ok(Self::Backend(SpeechBackend::Say)),
            other => Err(VisionError::ConfigInvalidValue {
                key: "speech.backend".to_string(),
                message: format!(
                    "unknown backend '{other}', expected one of auto, espeak-ng, spd-say, say, none"
                ),
            }),
        }
    }
}

/// Synthesizer that runs an external tool once per utterance.
pub struct CommandSynthesizer<E: CommandExecutor> {
    backend: SpeechBackend,
    rate: Option<u32>,
    executor: E,
}

impl<E: CommandExecutor> CommandSynthesizer<E> {
    pub fn new(backend: SpeechBackend, executor: E) -> Self {
        Self {
            backend,
            rate: None,
            executor,
        }
    }

    pub fn with_rate(mut self, rate: Option<u32>) -> Self {
        self.rate = rate;
        self
    }
}

impl<E: CommandExecutor> SpeechSynthesizer for CommandSynthesizer<E> {
    fn speak(&mut self, text: &str) -> Result<()> {
        let args = self.backend.speak_args(text, self.rate);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.executor.execute(self.backend.command(), &args)?;
        Ok(())
    }

    fn name(&self) -> &str {
        self.backend.command()
    }
}

/// Build the synthesizer selected by `config`.
///
/// Returns `Ok(None)` when speech is disabled or no usable tool is installed;
/// the caller then runs without speech.
///
/// # Errors
/// Returns `VisionError::ConfigInvalidValue` for an unknown backend name.
pub fn synthesizer_from_config<E>(
    config: &SpeechConfig,
    executor: E,
) -> Result<Option<Box<dyn SpeechSynthesizer>>>
where
    E: CommandExecutor + 'static,
{
    let backend = match config.backend.parse::<SpeechChoice>()? {
        SpeechChoice::Disabled => {
            info!("speech disabled by configuration");
            return Ok(None);
        }
        SpeechChoice::Auto => match SpeechBackend::detect(&executor) {
            Some(backend) => backend,
            None => {
                warn!("no speech tool found (tried espeak-ng, spd-say, say); running without speech");
                return Ok(None);
            }
        },
        SpeechChoice::Backend(backend) => {
            if !backend.is_available(&executor) {
                warn!(%backend, "configured speech tool is not usable; running without speech");
                return Ok(None);
            }
            backend
        }
    };

    info!(%backend, "speech backend selected");
    Ok(Some(Box::new(
        CommandSynthesizer::new(backend, executor).with_rate(config.rate),
    )))
}

/// Playback event recorded by [`RecordingSynthesizer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackEvent {
    Started(String),
    Finished(String),
}

/// Synthesizer for tests: records playback instead of producing audio.
#[derive(Debug, Clone, Default)]
pub struct RecordingSynthesizer {
    events: Arc<Mutex<Vec<PlaybackEvent>>>,
    duration: Duration,
    fail_on: Option<String>,
}

impl RecordingSynthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every utterance take `duration` of wall-clock time.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    /// Fail playback of utterances equal to `text`.
    pub fn with_failure_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    pub fn events(&self) -> Vec<PlaybackEvent> {
        self.lock_events().clone()
    }

    /// Texts whose playback finished, in order.
    pub fn spoken(&self) -> Vec<String> {
        self.lock_events()
            .iter()
            .filter_map(|event| match event {
                PlaybackEvent::Finished(text) => Some(text.clone()),
                PlaybackEvent::Started(_) => None,
            })
            .collect()
    }

    fn lock_events(&self) -> std::sync::MutexGuard<'_, Vec<PlaybackEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SpeechSynthesizer for RecordingSynthesizer {
    fn speak(&mut self, text: &str) -> Result<()> {
        self.lock_events()
            .push(PlaybackEvent::Started(text.to_string()));
        if !self.duration.is_zero() {
            std::thread::sleep(self.duration);
        }
        if self.fail_on.as_deref() == Some(text) {
            return Err(VisionError::SpeechFailed {
                message: format!("refusing to speak '{text}'"),
            });
        }
        self.lock_events()
            .push(PlaybackEvent::Finished(text.to_string()));
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}
