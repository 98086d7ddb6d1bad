//! Testable execution of external speech tools.

use crate::error::{Result, VisionError};
use std::process::Command;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync so one executor can back several synthesizers.
pub trait CommandExecutor: Send + Sync {
    /// Run `command` to completion.
    ///
    /// Returns stdout on success.
    ///
    /// # Errors
    /// `VisionError::SpeechToolNotFound` if the command is not installed,
    /// `VisionError::SpeechFailed` if it cannot be started or exits unsuccessfully.
    fn execute(&self, command: &str, args: &[&str]) -> Result<String>;
}

/// Production command executor using std::process::Command.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(command).args(args).output().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                VisionError::SpeechToolNotFound {
                    tool: command.to_string(),
                }
            } else {
                VisionError::SpeechFailed {
                    message: format!("Failed to execute {}: {}", command, e),
                }
            }
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VisionError::SpeechFailed {
                message: format!("{} failed with status {:?}: {}", command, output.status, stderr.trim()),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Recording executor for tests.
///
/// Records every call and answers from a queue of responses, defaulting to success.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockCommandExecutor {
    calls: std::sync::Mutex<Vec<(String, Vec<String>)>>,
    responses: std::sync::Mutex<std::collections::VecDeque<Result<String>>>,
    missing: Vec<String>,
}

#[cfg(test)]
impl MockCommandExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a successful response to the queue.
    pub fn with_response(self, response: &str) -> Self {
        self.lock_responses().push_back(Ok(response.to_string()));
        self
    }

    /// Add an error response to the queue.
    pub fn with_error(self, error: VisionError) -> Self {
        self.lock_responses().push_back(Err(error));
        self
    }

    /// Report `tool` as not installed on every call.
    pub fn with_missing_tool(mut self, tool: &str) -> Self {
        self.missing.push(tool.to_string());
        self
    }

    /// Get all recorded calls.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.lock_calls().clone()
    }

    fn lock_calls(&self) -> std::sync::MutexGuard<'_, Vec<(String, Vec<String>)>> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, std::collections::VecDeque<Result<String>>> {
        self.responses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
impl CommandExecutor for MockCommandExecutor {
    fn execute(&self, command: &str, args: &[&str]) -> Result<String> {
        self.lock_calls().push((
            command.to_string(),
            args.iter().map(|s| s.to_string()).collect(),
        ));

        if self.missing.iter().any(|tool| tool == command) {
            return Err(VisionError::SpeechToolNotFound {
                tool: command.to_string(),
            });
        }

        self.lock_responses()
            .pop_front()
            .unwrap_or_else(|| Ok(String::new()))
    }
}
