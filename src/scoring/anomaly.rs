//! Z-score anomaly detection on total consumption

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use tracing::{debug, info};

use crate::pipeline::{FeatureTable, PipelineError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    /// Row in the feature table
    pub index: usize,
    pub timestamp: DateTime<FixedOffset>,
    pub total_consumption: f64,
    pub z_score: f64,
}

/// Z-scores of `values` against their own mean and sample standard deviation.
/// `None` for fewer than two values or zero variance.
pub fn z_scores(values: &[f64]) -> Option<Vec<f64>> {
    if values.len() < 2 {
        return None;
    }
    let mean = values.iter().mean();
    let std_dev = values.iter().std_dev();
    if !std_dev.is_finite() || std_dev <= f64::EPSILON * mean.abs().max(1.0) {
        return None;
    }
    Some(values.iter().map(|v| (v - mean) / std_dev).collect())
}

/// Rows whose total consumption has |z| above `threshold`, in table order
pub fn detect_anomalies(table: &FeatureTable, threshold: f64) -> Result<Vec<Anomaly>, PipelineError> {
    let consumption = table.column("total_consumption")?;
    let Some(scores) = z_scores(&consumption) else {
        debug!(rows = consumption.len(), "no variance in consumption; no anomalies");
        return Ok(Vec::new());
    };

    let anomalies: Vec<Anomaly> = scores
        .iter()
        .enumerate()
        .filter(|(_, z)| z.abs() > threshold)
        .map(|(index, &z_score)| Anomaly {
            index,
            timestamp: table.timestamps()[index],
            total_consumption: consumption[index],
            z_score,
        })
        .collect();

    info!(rows = consumption.len(), anomalies = anomalies.len(), threshold, "anomaly scan finished");
    Ok(anomalies)
}
