//! Command-line interface for chess-vision
//!
//! Provides argument parsing using clap derive macros.

use clap::{Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// Spoken move announcements from a chess vision service
#[derive(Parser, Debug)]
#[command(
    name = "chess-vision",
    version,
    about = "Stream board frames to a chess vision service and announce detected moves"
)]
pub struct Cli {
    /// Subcommand to execute (default: run the client)
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose output (-v: debug, -vv: trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Detection service endpoint (e.g., ws://localhost:8000/ws)
    #[arg(long, value_name = "URL")]
    pub endpoint: Option<String>,

    /// Directory of JPEG frames to stream in place of a camera
    #[arg(long, value_name = "DIR")]
    pub image_dir: Option<PathBuf>,

    /// Speech backend override (auto, espeak-ng, spd-say, say, none)
    #[arg(long, value_name = "BACKEND")]
    pub speech: Option<String>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check configuration and speech tools
    Check,

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: Shell,
    },
}

/// Configuration inspection actions
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration as TOML
    Show,
    /// Print the configuration file path
    Path,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_command() {
        let cli = Cli::try_parse_from(["chess-vision"]).unwrap();
        assert!(cli.command.is_none());
        assert!(cli.endpoint.is_none());
        assert!(cli.image_dir.is_none());
        assert!(cli.speech.is_none());
        assert!(!cli.quiet);
        assert_eq!(cli.verbose, 0);
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_verbose_double() {
        let cli = Cli::try_parse_from(["chess-vision", "-vv"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_verbose_repeated_flags() {
        let cli = Cli::try_parse_from(["chess-vision", "-v", "-v"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_parse_run_overrides() {
        let cli = Cli::try_parse_from([
            "chess-vision",
            "--endpoint",
            "ws://10.0.0.5:8000/ws",
            "--image-dir",
            "/tmp/frames",
            "--speech",
            "none",
        ])
        .unwrap();

        assert_eq!(cli.endpoint.as_deref(), Some("ws://10.0.0.5:8000/ws"));
        assert_eq!(cli.image_dir, Some(PathBuf::from("/tmp/frames")));
        assert_eq!(cli.speech.as_deref(), Some("none"));
    }

    #[test]
    fn test_parse_check() {
        let cli = Cli::try_parse_from(["chess-vision", "check"]).unwrap();
        match cli.command {
            Some(Commands::Check) => {}
            _ => panic!("Expected Check command"),
        }
    }

    #[test]
    fn test_parse_config_show() {
        let cli = Cli::try_parse_from(["chess-vision", "config", "show"]).unwrap();
        match cli.command {
            Some(Commands::Config {
                action: ConfigAction::Show,
            }) => {}
            _ => panic!("Expected Config Show command"),
        }
    }

    #[test]
    fn test_parse_completions() {
        let cli = Cli::try_parse_from(["chess-vision", "completions", "bash"]).unwrap();
        match cli.command {
            Some(Commands::Completions { shell }) => assert_eq!(shell, Shell::Bash),
            _ => panic!("Expected Completions command"),
        }
    }

    #[test]
    fn test_global_options_after_command() {
        let cli = Cli::try_parse_from(["chess-vision", "check", "--config", "/tmp/config.toml", "-q"])
            .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("/tmp/config.toml")));
        assert!(cli.quiet);
    }

    #[test]
    fn test_invalid_command_returns_error() {
        let result = Cli::try_parse_from(["chess-vision", "invalid"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::InvalidSubcommand);
    }

    #[test]
    fn test_version_flag() {
        let result = Cli::try_parse_from(["chess-vision", "--version"]);
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }
}
