use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

use crate::{
    api::{datasets::require_dataset, error::ApiError, response::ApiResponse, state::AppState},
    ml::{ForecastHorizon, ModelMetadata, TrainedModel},
};

/// Per-request overrides of the configured model settings
#[derive(Debug, Default, Deserialize)]
pub struct TrainQuery {
    pub epochs: Option<usize>,
    pub sequence_length: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub steps: Option<usize>,
}

#[derive(Debug, Serialize)]
pub struct ForecastResponse {
    pub building_id: String,
    pub model_id: String,
    #[serde(flatten)]
    pub horizon: ForecastHorizon,
}

/// POST /api/v1/buildings/:id/model/train
///
/// Fits a new model on the stored records in a blocking task and registers it
/// for the building, replacing the previous one.
pub async fn train(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    Query(q): Query<TrainQuery>,
) -> Result<(StatusCode, Json<ApiResponse<ModelMetadata>>), ApiError> {
    let dataset = require_dataset(&st, &building_id).await?;

    let mut config = st.cfg.model.clone();
    if let Some(epochs) = q.epochs {
        config.epochs = epochs;
    }
    if let Some(sequence_length) = q.sequence_length {
        config.sequence_length = sequence_length;
    }
    config.validate()?;

    let start = Instant::now();
    let model = tokio::task::spawn_blocking(move || TrainedModel::fit(&dataset.table, &config)).await??;
    let duration_ms = start.elapsed().as_millis() as u64;

    let model = st.models.register(building_id.as_str(), model).await;
    info!(
        building_id = %building_id,
        epochs_run = model.metadata().report.epochs_run(),
        duration_ms,
        "model trained"
    );

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(model.metadata().clone()).with_duration(duration_ms)),
    ))
}

/// GET /api/v1/buildings/:id/model
pub async fn get_model(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
) -> Result<ApiResponse<ModelMetadata>, ApiError> {
    let model = st
        .models
        .get(&building_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no model for building '{building_id}'")))?;
    Ok(ApiResponse::success(model.metadata().clone()))
}

/// GET /api/v1/buildings/:id/forecast
///
/// Seeds the forecast with the last window of stored records.
pub async fn forecast(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    Query(q): Query<ForecastQuery>,
) -> Result<ApiResponse<ForecastResponse>, ApiError> {
    let steps = q.steps.unwrap_or(st.cfg.model.forecast_steps);
    if steps == 0 {
        return Err(ApiError::BadRequest("steps must be positive".to_string()));
    }

    let dataset = require_dataset(&st, &building_id).await?;
    let model = st
        .models
        .get(&building_id)
        .await
        .ok_or(crate::ml::ModelError::UntrainedModel)?;

    let model_id = model.metadata().model_id.clone();
    let horizon = tokio::task::spawn_blocking(move || {
        let seed = model.seed_window(&dataset.table)?;
        model.forecast_horizon(&seed, steps)
    })
    .await??;

    Ok(ApiResponse::success(ForecastResponse {
        building_id,
        model_id,
        horizon,
    })
    .with_count(steps))
}
