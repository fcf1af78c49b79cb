use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

use crate::{
    api::{
        error::ApiError,
        response::ApiResponse,
        state::{AppState, Dataset},
    },
    pipeline::parse_records,
};

#[derive(Debug, Serialize)]
pub struct DatasetInfo {
    pub building_id: String,
    pub records: usize,
    pub columns: Vec<String>,
    pub floors: Vec<u32>,
    pub first_timestamp: Option<String>,
    pub last_timestamp: Option<String>,
    pub loaded_at: DateTime<Utc>,
}

impl DatasetInfo {
    fn new(building_id: &str, dataset: &Dataset) -> Self {
        let timestamps = dataset.table.timestamps();
        Self {
            building_id: building_id.to_string(),
            records: dataset.table.len(),
            columns: dataset.table.columns().to_vec(),
            floors: dataset.table.floor_ids().to_vec(),
            first_timestamp: timestamps.first().map(|t| t.to_rfc3339()),
            last_timestamp: timestamps.last().map(|t| t.to_rfc3339()),
            loaded_at: dataset.loaded_at,
        }
    }
}

/// Dataset stored for `building_id`, or 404
pub(crate) async fn require_dataset(st: &AppState, building_id: &str) -> Result<Arc<Dataset>, ApiError> {
    st.dataset(building_id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("no records for building '{building_id}'")))
}

/// GET /api/v1/buildings
pub async fn list_buildings(State(st): State<AppState>) -> Result<ApiResponse<Vec<DatasetInfo>>, ApiError> {
    let mut infos = Vec::new();
    for id in st.building_ids().await {
        if let Some(dataset) = st.dataset(&id).await {
            infos.push(DatasetInfo::new(&id, &dataset));
        }
    }
    let count = infos.len();
    Ok(ApiResponse::success(infos).with_count(count))
}

/// GET /api/v1/buildings/:id/records
pub async fn get_dataset(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
) -> Result<ApiResponse<DatasetInfo>, ApiError> {
    let dataset = require_dataset(&st, &building_id).await?;
    Ok(ApiResponse::success(DatasetInfo::new(&building_id, &dataset)))
}

/// PUT /api/v1/buildings/:id/records
///
/// Body is one JSON record or an array of records. Replaces any stored
/// records for the building.
pub async fn replace_records(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    body: String,
) -> Result<(StatusCode, Json<ApiResponse<DatasetInfo>>), ApiError> {
    let records = parse_records(&body)?;
    let dataset = st.put_dataset(building_id.as_str(), Dataset::build(records)?).await;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(DatasetInfo::new(&building_id, &dataset))),
    ))
}

/// POST /api/v1/buildings/:id/records
///
/// Appends to the stored records. The combined set is rebuilt as a whole, so
/// a duplicate timestamp rejects the upload and leaves the old set in place.
pub async fn append_records(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
    body: String,
) -> Result<ApiResponse<DatasetInfo>, ApiError> {
    let incoming = parse_records(&body)?;
    let dataset = st.append_records(building_id.as_str(), incoming).await?;
    Ok(ApiResponse::success(DatasetInfo::new(&building_id, &dataset)))
}

/// DELETE /api/v1/buildings/:id/records
pub async fn delete_records(
    State(st): State<AppState>,
    Path(building_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    if st.remove_dataset(&building_id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(format!("no records for building '{building_id}'")))
    }
}
