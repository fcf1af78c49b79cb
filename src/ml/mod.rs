//! Sequence Forecasting Engine
//!
//! Trains a stacked recurrent network on sliding windows of the feature table
//! and predicts the next full feature vector, one step or iterated over a
//! horizon.
//!
//! # Architecture
//! - [`scaler`]: per-feature min-max scaling fitted once and reused for inference
//! - [`windows`]: fixed-length sequence windows with a chronological split
//! - [`models`]: configuration-driven recurrent network (candle)
//! - [`training`]: mini-batch training with early stopping and best-weight restore
//! - [`forecaster`]: trained model state, prediction and horizon forecasts
//! - [`inference`]: per-building registry of trained models

use serde::{Deserialize, Serialize};

pub mod forecaster;
pub mod inference;
pub mod models;
pub mod scaler;
pub mod training;
pub mod windows;

pub use forecaster::*;
pub use inference::*;
pub use models::*;
pub use scaler::*;
pub use training::*;
pub use windows::*;

use crate::pipeline::PipelineError;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("model has not been trained; call fit first")]
    UntrainedModel,

    #[error("insufficient data: {0}")]
    InsufficientData(String),

    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("invalid model configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error("tensor backend error: {0}")]
    Backend(#[from] candle_core::Error),
}

impl ModelError {
    pub(crate) fn shape(expected: impl ToString, actual: impl ToString) -> Self {
        Self::ShapeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

/// Forecasting model hyperparameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Width of the first recurrent layer; later layers halve it
    pub lstm_units: usize,
    pub dropout_rate: f64,
    /// Epoch budget; early stopping may end training sooner
    pub epochs: usize,
    pub batch_size: usize,
    pub sequence_length: usize,
    pub learning_rate: f64,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    /// Smallest validation loss decrease counted as an improvement
    pub min_delta: f64,
    /// Fraction of windows (latest in time) held out for validation
    pub validation_split: f64,
    pub forecast_steps: usize,
    /// Longest horizon a forecast request may ask for
    pub max_forecast_steps: usize,
    /// Feature table columns the model reads and predicts, in order
    pub feature_columns: Vec<String>,
    /// Explicit layer stack; when absent a three-layer LSTM stack is derived
    /// from `lstm_units` and `dropout_rate`
    pub layers: Option<Vec<LayerSpec>>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            lstm_units: 50,
            dropout_rate: 0.2,
            epochs: 50,
            batch_size: 32,
            sequence_length: 24,
            learning_rate: 0.001,
            patience: 5,
            min_delta: 0.0,
            validation_split: 0.2,
            forecast_steps: 24,
            max_forecast_steps: 24 * 7,
            feature_columns: [
                "total_consumption",
                "temperature",
                "occupancy_level",
                "total_fan_consumption",
                "total_light_consumption",
                "computer_consumption",
                "projector_consumption",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            layers: None,
        }
    }
}

impl ModelConfig {
    pub fn network_spec(&self) -> NetworkSpec {
        match &self.layers {
            Some(layers) => NetworkSpec::new(layers.clone()),
            None => NetworkSpec::stacked_lstm(self.lstm_units, self.dropout_rate as f32),
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.sequence_length == 0 {
            return Err(ModelError::InvalidConfig("sequence_length must be positive".into()));
        }
        if self.batch_size == 0 {
            return Err(ModelError::InvalidConfig("batch_size must be positive".into()));
        }
        if self.feature_columns.is_empty() {
            return Err(ModelError::InvalidConfig("feature_columns is empty".into()));
        }
        if !(self.validation_split > 0.0 && self.validation_split < 1.0) {
            return Err(ModelError::InvalidConfig(format!(
                "validation_split must be in (0, 1), got {}",
                self.validation_split
            )));
        }
        if self.max_forecast_steps == 0 || self.forecast_steps > self.max_forecast_steps {
            return Err(ModelError::InvalidConfig(format!(
                "forecast_steps {} must not exceed max_forecast_steps {} (which must be positive)",
                self.forecast_steps, self.max_forecast_steps
            )));
        }
        if !(self.learning_rate >= 0.0 && self.learning_rate.is_finite()) {
            return Err(ModelError::InvalidConfig(format!(
                "learning_rate must be a non-negative number, got {}",
                self.learning_rate
            )));
        }
        self.network_spec().validate()
    }
}

/// Model family, recorded in metadata
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ModelType {
    Lstm,
    Gru,
}

/// Trained model metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelMetadata {
    pub model_id: String,
    pub model_type: ModelType,
    pub trained_at: chrono::DateTime<chrono::Utc>,
    pub training_samples: usize,
    pub validation_samples: usize,
    /// Measured on the held-out windows, in original units of the first feature
    pub validation_metrics: ValidationMetrics,
    pub feature_names: Vec<String>,
    pub sequence_length: usize,
    pub report: TrainingReport,
}

/// Validation Metrics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationMetrics {
    pub mae: f64,  // Mean Absolute Error
    pub mse: f64,  // Mean Square Error
    pub rmse: f64, // Root Mean Square Error
    pub mape: f64, // Mean Absolute Percentage Error
    pub r2: f64,   // R-squared
}

impl ValidationMetrics {
    /// Check if metrics meet quality thresholds
    pub fn meets_quality_threshold(&self, max_mape: f64, min_r2: f64) -> bool {
        self.mape <= max_mape && self.r2 >= min_r2
    }
}

/// Calculate validation metrics
pub fn calculate_metrics(predictions: &[f64], targets: &[f64]) -> Result<ValidationMetrics, ModelError> {
    if predictions.len() != targets.len() {
        return Err(ModelError::shape(
            format!("{} targets", predictions.len()),
            format!("{} targets", targets.len()),
        ));
    }

    if predictions.is_empty() {
        return Err(ModelError::InsufficientData("no predictions to evaluate".into()));
    }

    let n = predictions.len() as f64;
    let pairs = || predictions.iter().zip(targets.iter());

    let mae = pairs().map(|(p, t)| (p - t).abs()).sum::<f64>() / n;
    let mse = pairs().map(|(p, t)| (p - t).powi(2)).sum::<f64>() / n;

    // MAPE over targets that are not zero
    let (ape_sum, ape_count) = pairs()
        .filter(|(_, t)| t.abs() > 1e-10)
        .fold((0.0, 0usize), |(sum, count), (p, t)| {
            (sum + ((p - t) / t).abs() * 100.0, count + 1)
        });
    let mape = if ape_count == 0 { 0.0 } else { ape_sum / ape_count as f64 };

    let mean_target: f64 = targets.iter().sum::<f64>() / n;
    let ss_tot: f64 = targets.iter().map(|t| (t - mean_target).powi(2)).sum();
    let ss_res: f64 = pairs().map(|(p, t)| (t - p).powi(2)).sum();

    let r2 = if ss_tot.abs() < 1e-10 {
        0.0
    } else {
        1.0 - (ss_res / ss_tot)
    };

    Ok(ValidationMetrics {
        mae,
        mse,
        rmse: mse.sqrt(),
        mape,
        r2,
    })
}
