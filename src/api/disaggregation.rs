use axum::{extract::State, Json};
use serde::Deserialize;
use std::time::Instant;

use crate::{
    api::{error::ApiError, response::ApiResponse, state::AppState},
    disaggregation::{DisaggregationResult, Disaggregator},
    domain::{Appliance, UsageConstraints},
};

#[derive(Debug, Deserialize)]
pub struct DisaggregationRequest {
    pub total_kwh: f64,
    pub appliances: Vec<Appliance>,
    #[serde(default)]
    pub constraints: Option<UsageConstraints>,
    /// Overrides the configured period length
    #[serde(default)]
    pub period_days: Option<f64>,
}

/// POST /api/v1/disaggregate
pub async fn disaggregate(
    State(st): State<AppState>,
    Json(req): Json<DisaggregationRequest>,
) -> Result<ApiResponse<DisaggregationResult>, ApiError> {
    let start = Instant::now();
    let mut settings = st.cfg.disaggregation.clone();
    if let Some(days) = req.period_days {
        settings.period_days = days;
    }

    let result = Disaggregator::new(settings).estimate(
        req.total_kwh,
        &req.appliances,
        req.constraints.as_ref(),
    )?;

    let rows = result.rows.len();
    Ok(ApiResponse::success(result)
        .with_count(rows)
        .with_duration(start.elapsed().as_millis() as u64))
}
