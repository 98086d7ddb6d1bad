use anyhow::{Context, Result};
use chess_vision::cli::{Cli, Commands, ConfigAction};
use chess_vision::config::Config;
use chess_vision::coordinator::run_client;
use chess_vision::diagnostics::check_dependencies;
use clap::{CommandFactory, Parser};
use owo_colors::OwoColorize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose);

    match cli.command {
        None => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(endpoint) = cli.endpoint {
                config.connection.endpoint = endpoint;
            }
            if let Some(dir) = cli.image_dir {
                config.capture.image_dir = Some(dir);
            }
            if let Some(backend) = cli.speech {
                config.speech.backend = backend;
            }
            tracing::info!(version = %chess_vision::version_string(), "starting chess-vision");
            run_client(config).await?;
        }
        Some(Commands::Check) => {
            let config = load_config(cli.config.as_deref())?;
            if !check_dependencies(&config) {
                std::process::exit(1);
            }
        }
        Some(Commands::Config { action }) => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Some(Commands::Completions { shell }) => {
            clap_complete::generate(
                shell,
                &mut Cli::command(),
                "chess-vision",
                &mut std::io::stdout(),
            );
        }
    }

    Ok(())
}

/// Install the global subscriber. `RUST_LOG` takes precedence over the flags.
fn init_tracing(quiet: bool, verbose: u8) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("chess_vision={level},warn")));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/chess-vision/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => Config::load(path)?,
        None => Config::load_or_default(&Config::default_path()?)?,
    };

    Ok(config.with_env_overrides())
}

/// Handle configuration commands.
fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    let config_path = match custom_path {
        Some(path) => PathBuf::from(path),
        None => Config::default_path()?,
    };

    match action {
        ConfigAction::Show => {
            let config = Config::load_or_default(&config_path)
                .with_context(|| format!("loading {}", config_path.display()))?
                .with_env_overrides();
            print!("{}", config.to_toml()?);
            if let Err(e) = config.validate() {
                eprintln!("{} {}", "warning:".yellow(), e);
            }
        }
        ConfigAction::Path => {
            let exists = config_path.exists();
            println!("{}", config_path.display());
            if !exists {
                eprintln!("{}", "(file does not exist, defaults are used)".dimmed());
            }
        }
    }
    Ok(())
}
