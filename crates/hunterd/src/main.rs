use anyhow::{Context, Result};
use hunter_core::{Hunter, MatchPolicy};
use hunter_store::SqliteStore;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

mod config;
mod dbus_interface;
mod engine;

const BUS_NAME: &str = "org.hunter.Hunter1";
const OBJECT_PATH: &str = "/org/hunter/Hunter1";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("hunterd starting");

    let config = config::Config::load()?;
    tracing::info!(
        model_dir = %config.model_dir.display(),
        db_path = %config.db_path.display(),
        threshold = config.similarity_threshold,
        "configuration loaded"
    );

    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    let store = Arc::new(SqliteStore::open(&config.db_path)?);

    let engine = engine::spawn_engine(
        &config.detector_model_path(),
        &config.recognizer_model_path(),
        config.encoder_options(),
    )?;

    let hunter = Arc::new(Hunter::new(
        engine,
        Arc::clone(&store),
        store,
        MatchPolicy::new(config.similarity_threshold),
    ));
    let service = dbus_interface::HunterService::new(hunter, config.db_path.clone());

    let builder = if config.session_bus {
        zbus::connection::Builder::session()?
    } else {
        zbus::connection::Builder::system()?
    };
    let _conn = builder
        .name(BUS_NAME)?
        .serve_at(OBJECT_PATH, service)?
        .build()
        .await
        .context("registering on D-Bus")?;

    tracing::info!(
        bus = if config.session_bus { "session" } else { "system" },
        name = BUS_NAME,
        "hunterd ready"
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("hunterd shutting down");

    Ok(())
}
