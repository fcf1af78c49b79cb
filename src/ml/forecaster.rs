//! Trained model state and forecasting

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;
use tracing::{info, warn};

use super::{
    calculate_metrics, window_tensor, MinMaxScaler, ModelConfig, ModelError, ModelMetadata,
    ModelTrainer, SequenceModel, SequenceModelBuilder, SequenceWindows, TrainingConfig,
    ValidationMetrics,
};
use crate::pipeline::FeatureTable;

/// Iterated multi-step forecast. Each step feeds the previous prediction back
/// into the window, so error compounds with `steps`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastHorizon {
    pub steps: usize,
    pub feature_names: Vec<String>,
    /// One predicted feature vector per step, in original units
    pub predictions: Vec<Vec<f64>>,
}

impl ForecastHorizon {
    /// Predicted values of one feature across the horizon
    pub fn series(&self, feature: &str) -> Option<Vec<f64>> {
        let idx = self.feature_names.iter().position(|n| n == feature)?;
        Some(self.predictions.iter().map(|p| p[idx]).collect())
    }
}

/// Network weights plus the scaler fitted alongside them
pub struct TrainedModel {
    network: Box<dyn SequenceModel>,
    scaler: MinMaxScaler,
    metadata: ModelMetadata,
    max_forecast_steps: usize,
}

impl fmt::Debug for TrainedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TrainedModel")
            .field("spec", self.network.spec())
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl TrainedModel {
    /// Fit scaler and network on `table`
    pub fn fit(table: &FeatureTable, config: &ModelConfig) -> Result<Self, ModelError> {
        config.validate()?;
        let raw = table.select(&config.feature_columns)?;
        let scaler = MinMaxScaler::fit(&raw)?;
        let windows = SequenceWindows::new(scaler.transform(&raw)?, config.sequence_length)?;
        if windows.len() < 2 {
            return Err(ModelError::InsufficientData(format!(
                "{} rows with sequence_length {}",
                table.len(),
                config.sequence_length
            )));
        }

        let spec = config.network_spec();
        let model_type = spec.model_type();
        let network = SequenceModelBuilder::new(spec, windows.width()).build()?;
        let trainer = ModelTrainer::new(TrainingConfig::from(config));
        let (report, val_range) = trainer.train(&network, &windows)?;

        let mut model = Self {
            network: Box::new(network),
            scaler,
            metadata: ModelMetadata {
                model_id: format!("{}_{}", config.feature_columns[0], uuid::Uuid::new_v4()),
                model_type,
                trained_at: chrono::Utc::now(),
                training_samples: report.train_windows,
                validation_samples: report.validation_windows,
                validation_metrics: ValidationMetrics::default(),
                feature_names: config.feature_columns.clone(),
                sequence_length: config.sequence_length,
                report,
            },
            max_forecast_steps: config.max_forecast_steps,
        };

        let (predictions, targets): (Vec<f64>, Vec<f64>) = val_range
            .map(|i| {
                let predicted = model.predict_scaled(windows.window(i))?;
                let predicted = model.scaler.inverse_row(&predicted)?;
                let actual = model.scaler.inverse_row(windows.label(i))?;
                Ok((predicted[0], actual[0]))
            })
            .collect::<Result<Vec<_>, ModelError>>()?
            .into_iter()
            .unzip();
        model.metadata.validation_metrics = calculate_metrics(&predictions, &targets)?;

        info!(
            model_id = %model.metadata.model_id,
            mae = model.metadata.validation_metrics.mae,
            rmse = model.metadata.validation_metrics.rmse,
            "model trained"
        );
        Ok(model)
    }

    pub fn metadata(&self) -> &ModelMetadata {
        &self.metadata
    }

    pub fn feature_names(&self) -> &[String] {
        &self.metadata.feature_names
    }

    pub fn sequence_length(&self) -> usize {
        self.metadata.sequence_length
    }

    pub fn max_forecast_steps(&self) -> usize {
        self.max_forecast_steps
    }

    pub fn scaler(&self) -> &MinMaxScaler {
        &self.scaler
    }

    fn check_window(&self, window: &[Vec<f64>]) -> Result<(), ModelError> {
        if window.len() != self.sequence_length() {
            return Err(ModelError::shape(
                format!("{} rows", self.sequence_length()),
                format!("{} rows", window.len()),
            ));
        }
        let width = self.scaler.width();
        if let Some(row) = window.iter().find(|r| r.len() != width) {
            return Err(ModelError::shape(format!("{width} features"), row.len()));
        }
        Ok(())
    }

    fn predict_scaled(&self, scaled_window: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        let xs = window_tensor(scaled_window, self.network.device())?;
        let out: Vec<Vec<f32>> = self.network.forward_t(&xs, false)?.to_vec2()?;
        let row = out
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::shape("1 prediction", "0"))?;
        Ok(row.into_iter().map(f64::from).collect())
    }

    /// Next feature vector after `window`, in original units
    pub fn predict(&self, window: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        self.check_window(window)?;
        let scaled = self.scaler.transform(window)?;
        self.scaler.inverse_row(&self.predict_scaled(&scaled)?)
    }

    /// Predict `steps` vectors ahead by feeding each prediction back as the
    /// newest row of the window
    pub fn forecast_horizon(&self, seed: &[Vec<f64>], steps: usize) -> Result<ForecastHorizon, ModelError> {
        if steps > self.max_forecast_steps {
            return Err(ModelError::InvalidConfig(format!(
                "{steps} forecast steps requested, limit is {}",
                self.max_forecast_steps
            )));
        }
        self.check_window(seed)?;
        let mut window: VecDeque<Vec<f64>> = self.scaler.transform(seed)?.into();
        let mut predictions = Vec::new();
        for _ in 0..steps {
            let next = self.predict_scaled(window.make_contiguous())?;
            predictions.push(self.scaler.inverse_row(&next)?);
            window.pop_front();
            window.push_back(next);
        }
        Ok(ForecastHorizon {
            steps,
            feature_names: self.feature_names().to_vec(),
            predictions,
        })
    }

    /// The last `sequence_length` rows of `table` in this model's feature order
    pub fn seed_window(&self, table: &FeatureTable) -> Result<Vec<Vec<f64>>, ModelError> {
        let rows = table.select(self.feature_names())?;
        if rows.len() < self.sequence_length() {
            return Err(ModelError::InsufficientData(format!(
                "seed needs {} rows, table has {}",
                self.sequence_length(),
                rows.len()
            )));
        }
        Ok(rows[rows.len() - self.sequence_length()..].to_vec())
    }

    /// One-step-ahead accuracy on every window of `table` for `column`
    pub fn evaluate(&self, table: &FeatureTable, column: &str) -> Result<ValidationMetrics, ModelError> {
        let idx = self
            .feature_names()
            .iter()
            .position(|n| n == column)
            .ok_or_else(|| ModelError::Pipeline(crate::pipeline::PipelineError::UnknownColumn(column.into())))?;
        let rows = table.select(self.feature_names())?;
        let windows = SequenceWindows::new(rows, self.sequence_length())?;
        let mut predictions = Vec::with_capacity(windows.len());
        let mut targets = Vec::with_capacity(windows.len());
        for i in 0..windows.len() {
            predictions.push(self.predict(windows.window(i))?[idx]);
            targets.push(windows.label(i)[idx]);
        }
        calculate_metrics(&predictions, &targets)
    }
}

/// Forecaster that may or may not hold a trained model yet
#[derive(Debug)]
pub struct EnergyForecaster {
    config: ModelConfig,
    trained: Option<TrainedModel>,
}

impl EnergyForecaster {
    pub fn new(config: ModelConfig) -> Self {
        Self {
            config,
            trained: None,
        }
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn is_trained(&self) -> bool {
        self.trained.is_some()
    }

    /// Train on `table`, replacing any previous model
    pub fn fit(&mut self, table: &FeatureTable) -> Result<&TrainedModel, ModelError> {
        let model = TrainedModel::fit(table, &self.config)?;
        Ok(self.trained.insert(model))
    }

    pub fn model(&self) -> Result<&TrainedModel, ModelError> {
        self.trained.as_ref().ok_or_else(|| {
            warn!("forecast requested before training");
            ModelError::UntrainedModel
        })
    }

    pub fn into_model(self) -> Option<TrainedModel> {
        self.trained
    }

    pub fn predict(&self, window: &[Vec<f64>]) -> Result<Vec<f64>, ModelError> {
        self.model()?.predict(window)
    }

    pub fn forecast_horizon(&self, seed: &[Vec<f64>], steps: usize) -> Result<ForecastHorizon, ModelError> {
        self.model()?.forecast_horizon(seed, steps)
    }

    pub fn evaluate(&self, table: &FeatureTable, column: &str) -> Result<ValidationMetrics, ModelError> {
        self.model()?.evaluate(table, column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::fixtures::record;
    use crate::pipeline::build_feature_table;

    fn table(hours: usize) -> FeatureTable {
        let records: Vec<_> = (0..hours)
            .map(|h| {
                let load = 1000.0 + 400.0 * ((h % 24) as f64 / 24.0 * std::f64::consts::TAU).sin();
                let mut r = record(
                    &format!("2024-03-{:02}T{:02}:00:00", 1 + h / 24, h % 24),
                    load,
                );
                r.temperature = 18.0 + (h % 24) as f64 / 4.0;
                r
            })
            .collect();
        build_feature_table(&records).unwrap()
    }

    fn quick_config() -> ModelConfig {
        ModelConfig {
            lstm_units: 8,
            epochs: 3,
            batch_size: 16,
            sequence_length: 6,
            learning_rate: 0.01,
            feature_columns: vec!["total_consumption".into(), "temperature".into()],
            ..ModelConfig::default()
        }
    }

    #[test]
    fn test_untrained_model_fails_fast() {
        let forecaster = EnergyForecaster::new(quick_config());
        let seed = vec![vec![0.0, 0.0]; 6];
        assert!(matches!(forecaster.predict(&seed), Err(ModelError::UntrainedModel)));
        assert!(matches!(
            forecaster.forecast_horizon(&seed, 3),
            Err(ModelError::UntrainedModel)
        ));
        assert!(!forecaster.is_trained());
    }

    #[test]
    fn test_fit_and_forecast_shape() {
        let data = table(72);
        let mut forecaster = EnergyForecaster::new(quick_config());
        let model = forecaster.fit(&data).unwrap();
        assert_eq!(model.metadata().training_samples + model.metadata().validation_samples, 66);
        assert!(model.metadata().report.epochs_run() <= 3);

        let seed = model.seed_window(&data).unwrap();
        let next = forecaster.predict(&seed).unwrap();
        assert_eq!(next.len(), 2);
        assert!(next.iter().all(|v| v.is_finite()));

        let horizon = forecaster.forecast_horizon(&seed, 24).unwrap();
        assert_eq!(horizon.steps, 24);
        assert_eq!(horizon.predictions.len(), 24);
        assert!(horizon.predictions.iter().all(|p| p.len() == 2));
        assert_eq!(horizon.series("total_consumption").unwrap().len(), 24);

        let metrics = forecaster.evaluate(&data, "total_consumption").unwrap();
        assert!(metrics.mae.is_finite());
    }

    #[test]
    fn test_first_forecast_step_matches_predict() {
        let data = table(48);
        let mut forecaster = EnergyForecaster::new(quick_config());
        forecaster.fit(&data).unwrap();
        let seed = forecaster.model().unwrap().seed_window(&data).unwrap();

        let one = forecaster.predict(&seed).unwrap();
        let horizon = forecaster.forecast_horizon(&seed, 2).unwrap();
        for (a, b) in one.iter().zip(&horizon.predictions[0]) {
            assert!((a - b).abs() < 1e-6 * (1.0 + a.abs()));
        }
    }

    #[test]
    fn test_horizon_above_limit_is_rejected() {
        let data = table(48);
        let config = ModelConfig {
            max_forecast_steps: 10,
            forecast_steps: 10,
            ..quick_config()
        };
        let mut forecaster = EnergyForecaster::new(config);
        let model = forecaster.fit(&data).unwrap();
        assert_eq!(model.max_forecast_steps(), 10);
        let seed = model.seed_window(&data).unwrap();

        assert_eq!(forecaster.forecast_horizon(&seed, 10).unwrap().predictions.len(), 10);
        assert!(matches!(
            forecaster.forecast_horizon(&seed, 11),
            Err(ModelError::InvalidConfig(_))
        ));
        assert!(matches!(
            forecaster.forecast_horizon(&seed, usize::MAX),
            Err(ModelError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_bad_window_shape() {
        let data = table(48);
        let mut forecaster = EnergyForecaster::new(quick_config());
        forecaster.fit(&data).unwrap();
        assert!(matches!(
            forecaster.predict(&vec![vec![0.0, 0.0]; 5]),
            Err(ModelError::ShapeMismatch { .. })
        ));
        assert!(matches!(
            forecaster.predict(&vec![vec![0.0]; 6]),
            Err(ModelError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_too_little_data() {
        let mut forecaster = EnergyForecaster::new(quick_config());
        assert!(matches!(
            forecaster.fit(&table(7)),
            Err(ModelError::InsufficientData(_))
        ));
        assert!(matches!(
            forecaster.fit(&table(6)),
            Err(ModelError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_unknown_feature_column() {
        let config = ModelConfig {
            feature_columns: vec!["floor_9_fan".into()],
            ..quick_config()
        };
        let mut forecaster = EnergyForecaster::new(config);
        assert!(matches!(forecaster.fit(&table(30)), Err(ModelError::Pipeline(_))));
    }
}
