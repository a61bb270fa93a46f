//! Deadhand CLI - Kill child processes when their parents die
//!
//! Runs the detached watchdog (`deadhand watch`), inspects channel files, and
//! registers processes into a running watchdog's channel.

mod commands;

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use deadhand_core::{ConfigStore, Pid, Settings};
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Parser)]
#[command(name = "deadhand")]
#[command(author, version, about = "Kill child processes when their parents die")]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Log output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Configuration file (defaults to ~/.deadhand/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the watchdog (normally spawned by a producer)
    Watch {
        /// Main parent pid; when it dies every child is killed
        #[arg(long, value_parser = parse_pid)]
        parent: Pid,

        /// Channel file to read messages from
        #[arg(long)]
        channel: PathBuf,

        /// Settings as JSON, overriding the configuration file
        #[arg(long)]
        settings: Option<String>,

        /// Write logs to this file instead of stderr
        #[arg(long)]
        log_file: Option<PathBuf>,
    },

    /// Show the header and messages of a channel file
    #[command(alias = "show")]
    Inspect {
        /// Channel file
        channel: PathBuf,
    },

    /// Register a parent process
    Parent {
        /// Channel file of a running watchdog
        channel: PathBuf,
        pid: i64,
        /// Only children with this name are killed when the parent dies
        #[arg(short = 'n', long)]
        name: Option<String>,
    },

    /// Register a child process
    Child {
        /// Channel file of a running watchdog
        channel: PathBuf,
        pid: i64,
        /// Kill the child after this many milliseconds
        #[arg(long)]
        ttl: Option<u64>,
        #[arg(short = 'n', long)]
        name: Option<String>,
        /// Kill earlier children with the same name
        #[arg(long, requires = "name", conflicts_with = "ttl")]
        highlander: bool,
    },

    /// Kill children by name, or all children
    Kill {
        /// Channel file of a running watchdog
        channel: PathBuf,
        #[arg(short = 'n', long)]
        name: Option<String>,
    },

    /// Show current configuration
    Config {
        /// Write the current settings to the config file
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Watch {
            parent,
            channel,
            settings,
            log_file,
        } => {
            let settings = match settings {
                Some(json) => {
                    let settings: Settings =
                        serde_json::from_str(&json).context("Invalid --settings JSON")?;
                    settings.validate()?;
                    settings
                }
                None => load_settings(cli.config).await?,
            };
            let level = if settings.debug { "debug" } else { "info" };
            init_tracing(cli.log_format, log_file.as_deref(), level)?;
            commands::watch::run(parent, channel, settings).await?;
        }
        Commands::Inspect { channel } => {
            init_tracing(cli.log_format, None, "warn")?;
            commands::inspect::run(&channel, cli.json).await?;
        }
        Commands::Parent { channel, pid, name } => {
            init_tracing(cli.log_format, None, "warn")?;
            let settings = load_settings(cli.config).await?;
            commands::send::parent(channel, pid, name, settings, cli.json).await?;
        }
        Commands::Child {
            channel,
            pid,
            ttl,
            name,
            highlander,
        } => {
            init_tracing(cli.log_format, None, "warn")?;
            let settings = load_settings(cli.config).await?;
            let request = commands::send::ChildRequest {
                pid,
                ttl_ms: ttl,
                name,
                highlander,
            };
            commands::send::child(channel, request, settings, cli.json).await?;
        }
        Commands::Kill { channel, name } => {
            init_tracing(cli.log_format, None, "warn")?;
            let settings = load_settings(cli.config).await?;
            commands::send::kill(channel, name, settings, cli.json).await?;
        }
        Commands::Config { init } => {
            init_tracing(cli.log_format, None, "warn")?;
            let store = config_store(cli.config)?;
            commands::config::show(&store, init, cli.json).await?;
        }
    }

    Ok(())
}

fn parse_pid(value: &str) -> Result<Pid, String> {
    Pid::parse("parent", value).map_err(|e| e.to_string())
}

fn config_store(path: Option<PathBuf>) -> anyhow::Result<ConfigStore> {
    Ok(match path {
        Some(path) => ConfigStore::with_path(path),
        None => ConfigStore::new()?,
    })
}

async fn load_settings(path: Option<PathBuf>) -> anyhow::Result<Settings> {
    let store = config_store(path)?;
    let settings = store
        .load()
        .await
        .with_context(|| format!("Failed to load {}", store.config_path().display()))?;
    Ok(settings.with_env_overrides())
}

fn init_tracing(format: LogFormat, log_file: Option<&Path>, default_level: &str) -> anyhow::Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let (writer, ansi) = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(writer)
        .with_ansi(ansi);

    match format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to init tracing: {err}"))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to init tracing: {err}"))?,
    }

    Ok(())
}
