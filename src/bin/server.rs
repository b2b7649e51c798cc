//! territory-server binary
//!
//! Hosts the authoritative game engine: in-memory snapshot cache, durable
//! store, broadcaster, and the periodic metadata/integrity loops. Transport
//! framing is a separate process concern; this binary wires the engine core.
//!
//! ## Configuration (CLI / env / TOML via `config` crate)
//!
//! | Key                          | Default | Description                      |
//! |------------------------------|---------|----------------------------------|
//! | `TERRITORY_MAP_WIDTH`        | `100`   | Bootstrap game map width         |
//! | `TERRITORY_MAP_HEIGHT`       | `100`   | Bootstrap game map height        |
//! | `TERRITORY_SEED`             | `42`    | Bootstrap game terrain seed      |
//! | `TERRITORY_MAX_PLAYERS`      | `64`    | Bootstrap game player cap        |
//! | `TERRITORY_TICK_INTERVAL_MS` | `5000`  | Metadata refresh cadence         |
//! | `TERRITORY_SNAPSHOT_TTL_SECS`| `3600`  | Cache snapshot TTL               |
//! | `TERRITORY_SWEEP_INTERVAL_SECS` | `60` | Integrity sweep cadence          |

use anyhow::Result;
use clap::Parser;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use territory_engine::{
    broadcast::{Broadcaster, ChannelTransport},
    manager::{EngineConfig, GameManager},
    store::{MemoryCache, MemoryStore},
    types::GameSettings,
    StructureCatalog,
};

// ---------------------------------------------------------------------------
// CLI
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(name = "territory-server", about = "Territory Engine", version)]
struct Args {
    /// Optional TOML settings file (overridden by env / CLI)
    #[arg(long, env = "TERRITORY_CONFIG")]
    config: Option<String>,

    /// Bootstrap game map width
    #[arg(long, env = "TERRITORY_MAP_WIDTH", default_value_t = 100)]
    map_width: u32,

    /// Bootstrap game map height
    #[arg(long, env = "TERRITORY_MAP_HEIGHT", default_value_t = 100)]
    map_height: u32,

    /// Bootstrap game terrain seed
    #[arg(long, env = "TERRITORY_SEED", default_value_t = 42)]
    seed: u64,

    /// Bootstrap game player cap
    #[arg(long, env = "TERRITORY_MAX_PLAYERS", default_value_t = 64)]
    max_players: usize,

    /// Metadata refresh cadence (ms)
    #[arg(long, env = "TERRITORY_TICK_INTERVAL_MS", default_value_t = 5_000)]
    tick_interval_ms: u64,

    /// Skip creating the bootstrap game on startup
    #[arg(long)]
    no_bootstrap: bool,
}

/// Settings only reachable through the TOML file / environment layer.
#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    snapshot_ttl_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
}

fn load_file_settings(path: Option<&str>) -> Result<FileSettings> {
    let mut builder = config::Config::builder()
        .add_source(config::Environment::with_prefix("TERRITORY").try_parsing(true));
    if let Some(path) = path {
        builder = builder.add_source(config::File::with_name(path));
    }
    Ok(builder.build()?.try_deserialize().unwrap_or_default())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("territory_engine=debug".parse()?),
        )
        .init();

    let args = Args::parse();
    let file = load_file_settings(args.config.as_deref())?;

    let engine_config = EngineConfig {
        snapshot_ttl: Duration::from_secs(file.snapshot_ttl_secs.unwrap_or(3600)),
        ..Default::default()
    };
    let sweep_interval = Duration::from_secs(file.sweep_interval_secs.unwrap_or(60));

    log::info!(
        "starting territory-server (tick={}ms, ttl={:?}, sweep={:?})",
        args.tick_interval_ms,
        engine_config.snapshot_ttl,
        sweep_interval,
    );

    // Engine wiring: in-memory collaborators behind the trait boundaries.
    let cache = Arc::new(MemoryCache::new());
    let store = Arc::new(MemoryStore::new());
    let manager = Arc::new(GameManager::new(
        engine_config,
        Arc::new(StructureCatalog::standard()),
        cache,
        store,
    ));
    let transport = Arc::new(ChannelTransport::new());
    let broadcaster = Arc::new(Broadcaster::new(transport));

    if !args.no_bootstrap {
        let game = manager
            .create_game(GameSettings {
                name: "bootstrap".into(),
                map_width: args.map_width,
                map_height: args.map_height,
                seed: args.seed,
                max_players: args.max_players,
                tick_interval_ms: args.tick_interval_ms,
                ..Default::default()
            })
            .await?;
        log::info!("bootstrap game ready: {}", game.id);
    }

    // -----------------------------------------------------------------------
    // Periodic loops
    // -----------------------------------------------------------------------

    let tick_manager = manager.clone();
    let tick_broadcaster = broadcaster.clone();
    let tick_interval = Duration::from_millis(args.tick_interval_ms.max(100));
    let tick_handle = tokio::spawn(async move {
        let mut timer = tokio::time::interval(tick_interval);
        loop {
            timer.tick().await;
            for metadata in tick_manager.tick().await {
                tick_broadcaster.publish_metadata(metadata);
            }
        }
    });

    let sweep_manager = manager.clone();
    let sweep_handle = tokio::spawn(async move {
        let mut timer = tokio::time::interval(sweep_interval);
        loop {
            timer.tick().await;
            if let Err(e) = sweep_manager.run_integrity_sweep().await {
                log::error!("integrity sweep failed: {e}");
            }
        }
    });

    // -----------------------------------------------------------------------
    // Wait for shutdown signal
    // -----------------------------------------------------------------------

    tokio::select! {
        _ = tick_handle => {
            log::error!("metadata tick loop exited unexpectedly");
        }
        _ = sweep_handle => {
            log::error!("integrity sweep loop exited unexpectedly");
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("territory-server shutting down (SIGINT)");
        }
    }

    Ok(())
}
