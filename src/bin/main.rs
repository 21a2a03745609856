//! Inferer CLI - Discover references between collections
//!
//! Usage:
//!   inferer --db <name> [--db <name>...] [options]
//!   inferer --all [options]
//!
//! Examples:
//!   inferer --db shop --pretty
//!   inferer --all --sample-size 50 --uri mongodb://localhost:27017
//!   inferer --db shop --full-scan --config ./inferer.toml
//!
//! MongoDB is reached through the native driver unless a worker binary is
//! configured, in which case every store call goes through the worker.
//!
//! The report is written to stdout as JSON; logs go to stderr
//! (`RUST_LOG=inferer=debug` for more detail).

use clap::Parser;
use inferer::config::Settings;
use inferer::worker::WorkerClient;
use inferer::{Discover, DiscoveryReport, DocumentStore, MongoStore, WorkerDocumentStore};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "inferer")]
#[command(about = "Inferer - Discover implicit references in a document store")]
#[command(version)]
struct Cli {
    /// Database to scan (repeatable)
    #[arg(short = 'd', long = "db", value_name = "NAME")]
    databases: Vec<String>,

    /// Scan every database except the administrative ones
    #[arg(long, conflicts_with = "databases")]
    all: bool,

    /// Also report presence of plain fields
    #[arg(long)]
    full_scan: bool,

    /// Documents sampled per collection
    #[arg(short = 'n', long)]
    sample_size: Option<usize>,

    /// Connection string (overrides the config file)
    #[arg(long)]
    uri: Option<String>,

    /// Path to the worker binary (overrides the config file)
    #[arg(long)]
    worker: Option<PathBuf>,

    /// Config file (default: INFERER_CONFIG, ./inferer.toml, ~/.config/inferer/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pretty-print the JSON report
    #[arg(long)]
    pretty: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("inferer=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if cli.databases.is_empty() && !cli.all {
        eprintln!("Nothing to scan: pass --db <NAME> or --all");
        return ExitCode::FAILURE;
    }

    let settings = match load_settings(&cli) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let report = match discover(&cli, &settings).await {
        Ok(report) => report,
        Err(code) => return code,
    };

    let json = if cli.pretty {
        serde_json::to_string_pretty(&report)
    } else {
        serde_json::to_string(&report)
    };
    match json {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to serialize report: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Config file values with command-line overrides applied.
fn load_settings(cli: &Cli) -> Result<Settings, inferer::config::SettingsError> {
    let mut settings = match &cli.config {
        Some(path) => Settings::from_file(path)?,
        None => Settings::load()?,
    };

    if let Some(uri) = &cli.uri {
        settings.connection.connection_string = uri.clone();
    }
    if let Some(worker) = &cli.worker {
        settings.worker.path = Some(worker.display().to_string());
    }
    if cli.full_scan {
        settings.discover.allow_full_scan = true;
    }
    if let Some(n) = cli.sample_size {
        settings.discover.sample_size = n;
    }
    Ok(settings)
}

async fn discover(cli: &Cli, settings: &Settings) -> Result<DiscoveryReport, ExitCode> {
    let config = settings.discover.to_config().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        ExitCode::FAILURE
    })?;
    let store = open_store(settings).await?;
    let engine = Discover::new(store, config);

    let interrupt = engine.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted");
            interrupt.cancel();
        }
    });

    let report = if cli.all {
        engine.scan_all().await.map_err(|e| {
            eprintln!("Discovery failed: {}", e);
            ExitCode::FAILURE
        })?
    } else {
        engine.scan_databases(&cli.databases).await
    };

    if engine.is_cancelled() {
        eprintln!("Discovery cancelled");
        return Err(ExitCode::from(130));
    }
    Ok(report)
}

/// The native driver for MongoDB, the worker for anything else or when a
/// worker path is given explicitly.
async fn open_store(settings: &Settings) -> Result<Arc<dyn DocumentStore>, ExitCode> {
    let connection = settings.connection.to_params().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        ExitCode::FAILURE
    })?;

    if settings.worker.path.is_none() && connection.driver == "mongodb" {
        let store = MongoStore::connect(&connection.connection_string)
            .await
            .map_err(|e| {
                eprintln!("Failed to connect: {}", e);
                ExitCode::FAILURE
            })?;
        return Ok(Arc::new(store));
    }

    let client = WorkerClient::spawn_with_settings(settings)
        .await
        .map_err(|e| {
            eprintln!("Failed to start worker: {}", e);
            ExitCode::FAILURE
        })?;
    Ok(Arc::new(WorkerDocumentStore::new(Arc::new(client), connection)))
}
