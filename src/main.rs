use anyhow::Result;
use clap::Parser;
use std::net::SocketAddr;
use tracing::info;

mod config;
mod dashboard;
mod db;
mod engine;

use config::Config;
use dashboard::AppState;
use db::Database;
use engine::{CalibrationHandle, RecalibrationParams};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialise tracing / logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    config.validate()?;

    // Open database
    let db = Database::open(&config.database_path)?;
    info!("Database opened: {}", config.database_path);

    let params = match db.latest_recalibration()? {
        Some(p) => {
            info!("Loaded recalibration v{} (a={:.1}, b={:.1}, {} samples)", p.version, p.a, p.b, p.samples);
            p
        }
        None => {
            info!("No recalibration stored, using passthrough");
            RecalibrationParams::passthrough()
        }
    };

    let settings = config.engine_settings();
    info!(
        "Admission: edge > {:.3}, spread/total confidence >= {}",
        settings.min_edge, settings.min_confidence
    );

    let state = AppState {
        db,
        calibration: CalibrationHandle::new(params),
        settings,
        monitor: config.monitor_settings(),
        calibration_min_samples: config.calibration_min_samples,
    };
    let app = dashboard::router(state);
    let addr: SocketAddr = config.api_addr.parse()?;
    info!("API listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).await?;

    Ok(())
}
