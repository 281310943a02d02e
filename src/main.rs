#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::doc_markdown,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::uninlined_format_args
)]

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use portal_watch::checkpoint::{CheckpointStore, StatusValue};
use portal_watch::clock::SystemClock;
use portal_watch::monitor::{Monitor, MonitorSettings};
use portal_watch::notify::{self, Notification};
use portal_watch::session::WebDriverProvider;
use portal_watch::{retention, Config};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Watch a web portal's status date and notify when it changes.
#[derive(Parser, Debug)]
#[command(name = "portal-watch")]
#[command(version)]
#[command(about = "Watch a web portal's status date and notify when it changes.", long_about = None)]
struct Cli {
    /// Config file (default: ~/.portal-watch/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the poll loop
    Run {
        /// Run a single check cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Delete old screenshots, keeping the newest ones
    Purge {
        /// Number of screenshots to keep (default: artifacts.keep)
        #[arg(long)]
        keep: Option<usize>,
    },

    /// Inspect or change the stored status value
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointCommands,
    },

    /// Send a test notification through every configured notifier
    NotifyTest,
}

#[derive(Subcommand, Debug)]
enum CheckpointCommands {
    /// Print the stored value
    Show,
    /// Overwrite the stored value
    Set {
        /// New status value
        value: String,
    },
    /// Remove the checkpoint; the next check reports an update
    Clear,
}

fn init_logging(log_file: Option<&Path>) -> Result<()> {
    let file_layer = match log_file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("Failed to create log directory: {}", parent.display())
                })?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file: {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // lettre, reqwest and fantoccini all build rustls clients; pin the provider
    // so none of them has to guess.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();
    let config = Config::load_or_init(cli.config.as_deref())?;
    init_logging(config.log_file().as_deref())?;

    match cli.command {
        Commands::Run { once } => run(&config, once).await,
        Commands::Purge { keep } => {
            config.check_purge_target()?;
            let keep = keep.unwrap_or(config.artifacts.keep);
            let dir = config.artifacts_dir();
            let report = retention::purge(&dir, keep)?;
            println!(
                "{}: removed {}, kept {}, failed {}",
                dir.display(),
                report.removed,
                report.kept,
                report.failed
            );
            Ok(())
        }
        Commands::Checkpoint { action } => {
            let store = CheckpointStore::new(config.checkpoint_path());
            match action {
                CheckpointCommands::Show => match store.read_optional()? {
                    Some(value) => println!("{value}"),
                    None => println!("(no checkpoint at {})", store.path().display()),
                },
                CheckpointCommands::Set { value } => {
                    let value = StatusValue::new(value);
                    store.write(&value)?;
                    println!("Checkpoint set to {value}");
                }
                CheckpointCommands::Clear => {
                    store.clear()?;
                    println!("Checkpoint cleared");
                }
            }
            Ok(())
        }
        Commands::NotifyTest => notify_test(&config).await,
    }
}

async fn run(config: &Config, once: bool) -> Result<()> {
    config.validate()?;

    let notifiers = notify::create_notifiers(config)?;
    let mut monitor = Monitor::new(
        Arc::new(WebDriverProvider::new(config)),
        notifiers,
        CheckpointStore::new(config.checkpoint_path()),
        Arc::new(SystemClock),
        MonitorSettings::from_config(config),
    );

    info!(
        checkpoint = %config.checkpoint_path().display(),
        screenshots = %config.artifacts_dir().display(),
        interval_secs = config.monitor.check_interval_secs,
        "Starting portal watch"
    );

    let max_cycles = once.then_some(1);
    let outcome = tokio::select! {
        result = monitor.run(max_cycles) => Some(result),
        _ = tokio::signal::ctrl_c() => None,
    };

    match outcome {
        Some(Ok(())) => {
            monitor.shutdown().await;
            info!(cycles = monitor.cycles(), "Portal watch finished");
            Ok(())
        }
        Some(Err(fatal)) => Err(anyhow::Error::new(fatal).context("Portal watch aborted")),
        None => {
            warn!("Interrupted, closing browser session");
            monitor.shutdown().await;
            Ok(())
        }
    }
}

async fn notify_test(config: &Config) -> Result<()> {
    let notifiers = notify::create_notifiers(config)?;
    let store = CheckpointStore::new(config.checkpoint_path());
    let last = store
        .read_optional()
        .unwrap_or_default()
        .unwrap_or_else(|| StatusValue::new("(never)"));

    let notification = Notification::no_update(
        &config.monitor.subject_prefix,
        &last,
        chrono::Local::now().date_naive(),
    );
    let delivered = notifiers.notify(&notification).await;
    println!(
        "Test notification delivered by {delivered} of {} notifier(s)",
        notifiers.names().len()
    );
    if delivered == 0 {
        anyhow::bail!("No notifier accepted the test notification");
    }
    Ok(())
}
