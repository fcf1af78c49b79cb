use axum::{
    routing::{get, post},
    Router,
};

use crate::api::{datasets, disaggregation, forecast, scoring, state::AppState};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/disaggregate", post(disaggregation::disaggregate))
        .route("/buildings", get(datasets::list_buildings))
        .route(
            "/buildings/:id/records",
            get(datasets::get_dataset)
                .put(datasets::replace_records)
                .post(datasets::append_records)
                .delete(datasets::delete_records),
        )
        .route("/buildings/:id/summary", get(scoring::summary))
        .route("/buildings/:id/hourly", get(scoring::hourly))
        .route("/buildings/:id/equipment", get(scoring::equipment))
        .route("/buildings/:id/trend", get(scoring::trend))
        .route("/buildings/:id/cost", get(scoring::cost))
        .route("/buildings/:id/score", get(scoring::score))
        .route("/buildings/:id/anomalies", get(scoring::anomalies))
        .route("/buildings/:id/insights", post(scoring::insights))
        .route("/buildings/:id/model", get(forecast::get_model))
        .route("/buildings/:id/model/train", post(forecast::train))
        .route("/buildings/:id/forecast", get(forecast::forecast))
        .with_state(state)
}
