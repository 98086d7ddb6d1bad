//! Spoken output: external synthesis tools and the playback queue.

pub mod executor;
pub mod queue;
pub mod synthesizer;

#[cfg(test)]
pub use executor::MockCommandExecutor;
pub use executor::{CommandExecutor, SystemCommandExecutor};
pub use queue::SpeechQueue;
pub use synthesizer::{
    CommandSynthesizer, PlaybackEvent, RecordingSynthesizer, SpeechBackend, SpeechChoice,
    SpeechSynthesizer, synthesizer_from_config,
};
