//! FlightSurety Node Binary
//!
//! Runs the engine actor with a simulated oracle fleet until interrupted.

use anyhow::Context;
use escrow::RecordingPayout;
use std::sync::Arc;
use surety_core::config::{LogFormat, StorageBackend};
use surety_core::{Config, MemoryStore, RocksStore, StateStore};
use surety_node::{spawn_engine_actor, OracleFleet, StatusSource, SuretyEngine, SystemClock};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// First address of the simulated oracle fleet
const FLEET_BASE_ADDRESS: u64 = 0x0a00;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let (config, source) = if let Ok(config_path) = std::env::var("SURETY_CONFIG") {
        let config = Config::from_file(&config_path)
            .with_context(|| format!("loading config from {}", config_path))?;
        (config, config_path)
    } else {
        (Config::from_env()?, "environment".to_string())
    };

    // Initialize tracing
    match config.node.log_format {
        LogFormat::Json => tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(log_filter())
            .init(),
        LogFormat::Pretty => tracing_subscriber::registry()
            .with(fmt::layer())
            .with(log_filter())
            .init(),
    }

    info!("Starting FlightSurety node");
    info!("Config loaded from: {}", source);

    match config.storage.backend {
        StorageBackend::Memory => {
            info!("Using in-memory store");
            run(MemoryStore::new(), &config).await
        }
        StorageBackend::Rocksdb => {
            info!("Opening store at: {:?}", config.storage.data_dir);
            let store = RocksStore::open(&config.storage)?;
            run(store, &config).await
        }
    }
}

/// `RUST_LOG` when set, `info` otherwise
fn log_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

async fn run<S>(store: S, config: &Config) -> anyhow::Result<()>
where
    S: StateStore + Send + 'static,
{
    let payout = Arc::new(RecordingPayout::new());
    let engine = SuretyEngine::new(store, config, payout, Arc::new(SystemClock))?;
    let (handle, actor) = spawn_engine_actor(engine, config.node.mailbox_capacity);

    // Event log
    let mut events = handle.subscribe();
    let logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(json) => info!(event = event.name(), "{}", json),
                    Err(e) => warn!("Unable to encode event: {}", e),
                },
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event log lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    // Oracle fleet
    let fleet = if config.node.simulated_oracles > 0 {
        let fleet = OracleFleet::register(
            &handle,
            config.node.simulated_oracles,
            FLEET_BASE_ADDRESS,
            config.policy()?.registration_fee,
            StatusSource::Random {
                seed: rand::random(),
            },
        )
        .await?;
        Some(fleet.spawn(handle.clone(), handle.subscribe()))
    } else {
        None
    };

    info!("FlightSurety node running");
    info!("- Operational: {}", handle.is_operational().await?);
    info!("- Airlines: {}", handle.airlines_count().await?);
    info!("- Oracles: {}", config.node.simulated_oracles);

    // Wait for shutdown signal
    match signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(err) => {
            error!("Unable to listen for shutdown signal: {}", err);
        }
    }

    // Graceful shutdown
    info!("Shutting down FlightSurety node...");
    match handle.render_metrics().await {
        Ok(text) => info!("Final metrics:\n{}", text),
        Err(e) => warn!("Unable to render metrics: {}", e),
    }

    handle.shutdown().await?;
    actor.await.context("engine actor panicked")?;
    if let Some(fleet) = fleet {
        fleet.abort();
    }
    logger.abort();

    info!("FlightSurety node stopped");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn test_log_filter_defaults_to_info() {
        std::env::remove_var("RUST_LOG");
        assert_eq!(log_filter().max_level_hint(), Some(LevelFilter::INFO));
    }
}
