//! HTTP surface driven through the router without a socket

mod common;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode},
    Router,
};
use building_energy_analytics::api::{router, AppState};
use building_energy_analytics::config::Config;
use building_energy_analytics::ml::ModelConfig;
use common::{daily_cycle, record, records_json};
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let mut cfg = Config::default();
    cfg.model = ModelConfig {
        lstm_units: 4,
        epochs: 2,
        batch_size: 16,
        sequence_length: 4,
        feature_columns: vec!["total_consumption".into(), "temperature".into()],
        ..ModelConfig::default()
    };
    router(AppState::new(cfg))
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let body = match body {
        Some(v) => Body::from(v.to_string()),
        None => Body::empty(),
    };
    send_body(app, method, uri, body).await
}

async fn send_body(app: &Router, method: Method, uri: &str, body: Body) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(body)
        .unwrap();

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let app = app();
    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["datasets"], 0);
}

#[tokio::test]
async fn test_disaggregate_endpoint() {
    let app = app();
    let request = json!({
        "total_kwh": 100.0,
        "appliances": [
            {"name": "A", "rated_wattage": 100.0},
            {"name": "B", "rated_wattage": 1000.0}
        ]
    });
    let (status, body) = send(&app, Method::POST, "/api/v1/disaggregate", Some(request)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["metadata"]["total_count"], 2);

    let rows = body["data"]["rows"].as_array().unwrap();
    let a = rows[0]["estimated_hours"].as_f64().unwrap();
    let b = rows[1]["estimated_hours"].as_f64().unwrap();
    assert!((a - b).abs() < 1e-3);

    let infeasible = json!({
        "total_kwh": 1000.0,
        "appliances": [{"name": "Heater", "rated_wattage": 100.0}],
        "constraints": {"Heater": {"min": 0.0, "max": 1.0}}
    });
    let (status, body) = send(&app, Method::POST, "/api/v1/disaggregate", Some(infeasible)).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "Unprocessable");
}

#[tokio::test]
async fn test_dataset_views() {
    let app = app();
    let (status, _) = send(&app, Method::GET, "/api/v1/buildings/hq/summary", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/buildings/hq/records",
        Some(records_json(&daily_cycle(48))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["records"], 48);
    assert_eq!(body["data"]["floors"], json!([1, 2]));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/buildings/hq/records",
        Some(json!(record(48, 1000.0))),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/summary?range=All", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["record_count"], 49);

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/trend?frame=Daily", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["total_count"], 3);

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/hourly", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["metadata"]["total_count"], 24);

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/equipment", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["floors"]["1"].as_f64().unwrap() > 0.0);

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/cost", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["currency"], "USD");

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/score", None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["data"]["efficiency"]["score"].as_u64().unwrap() <= 100);

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/anomalies?threshold=3", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"], json!([]));

    let (status, _) = send(
        &app,
        Method::POST,
        "/api/v1/buildings/hq/insights",
        Some(json!({"implemented": ["Peak Usage"], "top": 2})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"][0]["building_id"], "hq");

    let (status, _) = send(&app, Method::DELETE, "/api/v1/buildings/hq/records", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, Method::DELETE, "/api/v1/buildings/hq/records", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_bad_uploads() {
    let app = app();

    let mut records = daily_cycle(5);
    records[3].total_consumption = None;
    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/buildings/hq/records",
        Some(records_json(&records)),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains('3'));

    let (status, body) = send(
        &app,
        Method::PUT,
        "/api/v1/buildings/hq/records",
        Some(json!([records_json(&daily_cycle(1))[0].clone(), {"timestamp": 12}])),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("index 1"));

    let (status, _) = send_body(&app, Method::POST, "/api/v1/buildings/hq/records", Body::from("[{\"timestamp\":")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["datasets"], 0);
}

#[tokio::test]
async fn test_train_then_forecast() {
    let app = app();
    send(
        &app,
        Method::PUT,
        "/api/v1/buildings/hq/records",
        Some(records_json(&daily_cycle(40))),
    )
    .await;

    let (status, _) = send(&app, Method::GET, "/api/v1/buildings/hq/forecast", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    let (status, _) = send(&app, Method::GET, "/api/v1/buildings/hq/model", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, Method::POST, "/api/v1/buildings/hq/model/train?epochs=1", None).await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["data"]["sequence_length"], 4);

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/model", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["feature_names"], json!(["total_consumption", "temperature"]));

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/forecast?steps=5", None).await;
    assert_eq!(status, StatusCode::OK);
    let predictions = body["data"]["predictions"].as_array().unwrap();
    assert_eq!(predictions.len(), 5);
    assert!(predictions.iter().all(|p| p.as_array().unwrap().len() == 2));

    let (status, body) = send(&app, Method::GET, "/api/v1/buildings/hq/forecast?steps=1000", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["message"].as_str().unwrap().contains("limit is 168"));

    let (status, _) = send(&app, Method::GET, "/api/v1/buildings/hq/forecast?steps=0", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}
