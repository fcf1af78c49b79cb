pub mod datasets;
pub mod disaggregation;
pub mod error;
pub mod forecast;
pub mod health;
pub mod response;
pub mod scoring;
pub mod state;
pub mod v1;

pub use state::{AppState, Dataset};

use axum::{routing::get, Router};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

pub fn router(state: AppState) -> Router {
    let server = state.cfg.server.clone();

    let health = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/live", get(health::liveness_check))
        .with_state(state.clone());

    Router::new()
        .merge(health)
        .nest("/api/v1", v1::router(state))
        .layer(
            ServiceBuilder::new()
                .layer(axum::extract::DefaultBodyLimit::max(server.body_limit_bytes))
                .layer(TimeoutLayer::new(Duration::from_secs(server.request_timeout_secs))),
        )
        .layer(TraceLayer::new_for_http())
}
