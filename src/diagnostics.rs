//! Environment checks for the `check` command.

use crate::config::Config;
use crate::error::VisionError;
use crate::speech::{CommandExecutor, SpeechBackend, SpeechChoice, SystemCommandExecutor};

/// Result of checking a single dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckResult {
    /// Tool is installed and working
    Ok,
    /// Tool is not found
    NotFound,
    /// Tool is found but has issues
    Warning(String),
}

/// Check whether a speech backend can be run.
pub fn check_backend(backend: SpeechBackend, executor: &dyn CommandExecutor) -> CheckResult {
    match executor.execute(backend.command(), backend.probe_args()) {
        Ok(_) => CheckResult::Ok,
        Err(VisionError::SpeechToolNotFound { .. }) => CheckResult::NotFound,
        Err(e) => CheckResult::Warning(e.to_string()),
    }
}

fn install_hint(backend: SpeechBackend) -> &'static [&'static str] {
    match backend {
        SpeechBackend::EspeakNg => &[
            "Install: sudo apt install espeak-ng  (Debian/Ubuntu)",
            "         sudo pacman -S espeak-ng    (Arch)",
        ],
        SpeechBackend::SpdSay => &[
            "Install: sudo apt install speech-dispatcher  (Debian/Ubuntu)",
            "         sudo pacman -S speech-dispatcher    (Arch)",
        ],
        SpeechBackend::Say => &["Built into macOS"],
    }
}

/// Run all checks against `config` and print results.
///
/// Returns true when the client can speak with the configured backend.
pub fn check_dependencies(config: &Config) -> bool {
    check_dependencies_with(config, &SystemCommandExecutor::new())
}

fn check_dependencies_with(config: &Config, executor: &dyn CommandExecutor) -> bool {
    println!("Checking chess-vision environment...\n");

    println!("Configuration:");
    match config.validate() {
        Ok(()) => println!("  ✓ valid"),
        Err(e) => println!("  ✗ {}", e),
    }
    println!("  Endpoint:  {}", config.connection.endpoint);
    match &config.capture.image_dir {
        Some(dir) if dir.is_dir() => println!("  Images:    ✓ {}", dir.display()),
        Some(dir) => println!("  Images:    ✗ {} is not a directory", dir.display()),
        None => println!("  Images:    - none configured (no frames will be sent)"),
    }
    println!();

    println!("Speech backends:");
    let mut available = Vec::new();
    for backend in SpeechBackend::ALL {
        print!("  {:<10} ", backend.command());
        match check_backend(backend, executor) {
            CheckResult::Ok => {
                println!("✓ OK");
                available.push(backend);
            }
            CheckResult::NotFound => {
                println!("- not installed");
                for line in install_hint(backend) {
                    println!("             {}", line);
                }
            }
            CheckResult::Warning(msg) => println!("⚠ WARNING: {}", msg),
        }
    }
    println!();

    match config.speech.backend.parse::<SpeechChoice>() {
        Ok(SpeechChoice::Disabled) => {
            println!("Speech is disabled by configuration.");
            true
        }
        Ok(SpeechChoice::Auto) => match available.first() {
            Some(backend) => {
                println!("✓ Announcements will use {}.", backend);
                true
            }
            None => {
                println!("⚠ No speech tool found. Announcements will be silent.");
                false
            }
        },
        Ok(SpeechChoice::Backend(backend)) if available.contains(&backend) => {
            println!("✓ Announcements will use {}.", backend);
            true
        }
        Ok(SpeechChoice::Backend(backend)) => {
            println!("⚠ Configured backend {} is not usable. Announcements will be silent.", backend);
            false
        }
        Err(e) => {
            println!("✗ {}", e);
            false
        }
    }
}
