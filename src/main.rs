use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use axum::extract::FromRef;
use clap::{Parser, Subcommand};
use directories_next::ProjectDirs;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;
mod controllers;
mod keygen;
mod models;
mod storage;
mod syntax;
pub(crate) mod types;

mod error;
pub(crate) use error::ApiResult;

use config::{Config, StoreKind};
use controllers::paste::PasteService;
use storage::memory::MemoryStore;
use storage::AnyStore;
use syntax::SyntaxTable;

const CONFIG_FILE: &str = "config.toml";

/// How often the in-memory store drops expired pastes.
const MEMORY_SWEEP_PERIOD: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(version, about = "A paste bin with short keys and expiring pastes")]
struct Cli {
    /// Path to the config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server.
    Serve,
    /// Check that the configured store is reachable.
    Check,
}

#[derive(Clone, FromRef)]
pub struct App {
    pub config: Config,
    pub service: PasteService,
    /// Cancelled on shutdown; request tokens are children of it.
    pub shutdown: CancellationToken,
}

impl App {
    pub fn new(config: Config, store: AnyStore) -> Self {
        let syntax = SyntaxTable::with_overrides(&config.syntax);
        App {
            config,
            service: PasteService::new(store, syntax),
            shutdown: CancellationToken::new(),
        }
    }

    /// Connect to the configured store and start its background upkeep.
    pub async fn init(config: Config) -> anyhow::Result<Self> {
        let shutdown = CancellationToken::new();

        let store: AnyStore = match config.store.kind {
            #[cfg(feature = "redis-store")]
            StoreKind::Redis => {
                let redis = storage::redis::RedisStore::connect(&config.store.redis).await?;
                redis.spawn_idle_reaper(config.store.redis.idle_timeout(), shutdown.clone());
                redis.into()
            }
            StoreKind::Memory => {
                let memory = MemoryStore::new();
                memory.spawn_sweeper(MEMORY_SWEEP_PERIOD, shutdown.clone());
                memory.into()
            }
        };

        Ok(App {
            shutdown,
            ..App::new(config, store)
        })
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let config_path = match cli.config {
        Some(path) => path,
        None => default_config_path()?,
    };
    let config = Config::load(&config_path)?;

    let app = App::init(config).await?;

    match cli.command {
        Command::Serve => commands::serve::run(app).await,
        Command::Check => commands::check::run(app).await,
    }
}

/// `./config.toml` if present, otherwise the platform config directory.
fn default_config_path() -> anyhow::Result<PathBuf> {
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Ok(local);
    }

    let dirs = ProjectDirs::from("", "", "snipbin").context("no home directory found")?;
    Ok(dirs.config_dir().join(CONFIG_FILE))
}
