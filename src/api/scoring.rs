use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    api::{datasets::require_dataset, error::ApiError, response::ApiResponse, state::AppState},
    pipeline::{cost_breakdown, ConsumptionSummary, CostBreakdown, DateRange, EquipmentUsage, PeriodBucket, TimeFrame},
    scoring::{
        detect_anomalies, recommend_from_breakdown, score_latest, Anomaly, EfficiencyScore,
        Insight, InsightCategory, Recommendation, RecommendationEngine,
    },
};

#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub range: Option<DateRange>,
}

#[derive(Debug, Deserialize)]
pub struct TrendQuery {
    pub frame: Option<TimeFrame>,
    pub range: Option<DateRange>,
}

#[derive(Debug, Deserialize)]
pub struct AnomalyQuery {
    pub threshold: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct EquipmentResponse {
    pub equipment: EquipmentUsage,
    pub total: f64,
    /// Fan plus light consumption per floor id
    pub floors: BTreeMap<u32, f64>,
}

#[derive(Debug, Serialize)]
pub struct ScoreResponse {
    pub efficiency: EfficiencyScore,
    pub recommendations: Vec<Recommendation>,
}

#[derive(Debug, Default, Deserialize)]
pub struct InsightRequest {
    /// Categories the caller has already acted on
    #[serde(default)]
    pub implemented: BTreeSet<InsightCategory>,
    /// Return only the `top` insights by potential savings
    #[serde(default)]
    pub top: Option<usize>,
}

/// GET /api/v1/buildings/:id/summary
pub async fn summary(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    Query(q): Query<RangeQuery>,
) -> Result<ApiResponse<ConsumptionSummary>, ApiError> {
    let dataset = require_dataset(&st, &building_id).await?;
    let table = q.range.unwrap_or(DateRange::All).apply(&dataset.table);
    Ok(ApiResponse::success(table.summary()?))
}

/// GET /api/v1/buildings/:id/hourly
pub async fn hourly(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    Query(q): Query<RangeQuery>,
) -> Result<ApiResponse<BTreeMap<u32, f64>>, ApiError> {
    let dataset = require_dataset(&st, &building_id).await?;
    let table = q.range.unwrap_or(DateRange::All).apply(&dataset.table);
    let hourly = table.hourly_mean_consumption()?;
    let count = hourly.len();
    Ok(ApiResponse::success(hourly).with_count(count))
}

/// GET /api/v1/buildings/:id/equipment
pub async fn equipment(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    Query(q): Query<RangeQuery>,
) -> Result<ApiResponse<EquipmentResponse>, ApiError> {
    let dataset = require_dataset(&st, &building_id).await?;
    let table = q.range.unwrap_or(DateRange::All).apply(&dataset.table);
    let equipment = table.equipment_consumption()?;
    Ok(ApiResponse::success(EquipmentResponse {
        total: equipment.total(),
        equipment,
        floors: table.floor_consumption()?,
    }))
}

/// GET /api/v1/buildings/:id/trend
pub async fn trend(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    Query(q): Query<TrendQuery>,
) -> Result<ApiResponse<Vec<PeriodBucket>>, ApiError> {
    let dataset = require_dataset(&st, &building_id).await?;
    let table = q.range.unwrap_or(DateRange::All).apply(&dataset.table);
    let buckets = table.resample(q.frame.unwrap_or(TimeFrame::Daily))?;
    let count = buckets.len();
    Ok(ApiResponse::success(buckets).with_count(count))
}

/// GET /api/v1/buildings/:id/cost
pub async fn cost(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    Query(q): Query<RangeQuery>,
) -> Result<ApiResponse<CostBreakdown>, ApiError> {
    let dataset = require_dataset(&st, &building_id).await?;
    let table = q.range.unwrap_or(DateRange::All).apply(&dataset.table);
    Ok(ApiResponse::success(cost_breakdown(&table, &st.cfg.tariff)?))
}

/// GET /api/v1/buildings/:id/score
///
/// Scores the latest record and derives threshold recommendations from the
/// breakdown.
pub async fn score(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
) -> Result<ApiResponse<ScoreResponse>, ApiError> {
    let dataset = require_dataset(&st, &building_id).await?;
    let efficiency = score_latest(&dataset.records, &st.cfg.scoring)
        .ok_or_else(|| ApiError::Unprocessable("dataset has no records".to_string()))?;
    let recommendations = recommend_from_breakdown(&efficiency, &st.cfg.scoring);
    Ok(ApiResponse::success(ScoreResponse {
        efficiency,
        recommendations,
    }))
}

/// GET /api/v1/buildings/:id/anomalies
pub async fn anomalies(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    Query(q): Query<AnomalyQuery>,
) -> Result<ApiResponse<Vec<Anomaly>>, ApiError> {
    let threshold = q.threshold.unwrap_or(st.cfg.scoring.anomaly_threshold);
    if !threshold.is_finite() || threshold <= 0.0 {
        return Err(ApiError::BadRequest(format!(
            "threshold must be positive, got {threshold}"
        )));
    }
    let dataset = require_dataset(&st, &building_id).await?;
    let flagged = detect_anomalies(&dataset.table, threshold)?;
    let count = flagged.len();
    Ok(ApiResponse::success(flagged).with_count(count))
}

/// POST /api/v1/buildings/:id/insights
pub async fn insights(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    Json(req): Json<InsightRequest>,
) -> Result<ApiResponse<Vec<Insight>>, ApiError> {
    let dataset = require_dataset(&st, &building_id).await?;
    let report = RecommendationEngine::new(st.cfg.tariff.clone())
        .generate(&dataset.table, &req.implemented)?;

    let insights: Vec<Insight> = match req.top {
        Some(n) => report.top_by_savings(n).into_iter().cloned().collect(),
        None => report.insights,
    };
    let count = insights.len();
    Ok(ApiResponse::success(insights).with_count(count))
}
