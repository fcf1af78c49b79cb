use anyhow::{Context, Result};
use building_energy_analytics::{api, config, pipeline, telemetry};
use config::Config;
use telemetry::init_tracing;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cfg = Config::load()?;
    let state = api::AppState::new(cfg.clone());

    if let Some(dir) = &cfg.data.dir {
        let records = pipeline::load_records_from_dir(dir)
            .with_context(|| format!("preloading records from {}", dir.display()))?;
        let dataset = api::Dataset::build(records)?;
        state.put_dataset(cfg.data.building_id.as_str(), dataset).await;
    }

    let app = api::router(state);
    let addr = cfg.server.socket_addr()?;

    if cfg.server.host == "0.0.0.0" {
        warn!("server binding to 0.0.0.0; the API is reachable from the network");
    }

    info!(%addr, "starting building energy analytics");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(telemetry::shutdown_signal())
        .await?;

    warn!("shutdown complete");
    Ok(())
}
