//! Model training
//!
//! Mini-batch training over chronologically ordered windows with MSE loss,
//! validation MAE monitoring, and early stopping that restores the weights of
//! the best validation epoch.

use candle_core::Tensor;
use candle_nn::{loss, AdamW, Optimizer, ParamsAdamW, VarMap};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Range;
use tracing::{debug, info};

use super::{ModelConfig, ModelError, SequenceModel, SequenceWindows};

/// Stopping and optimiser settings for one training run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub max_epochs: usize,
    pub batch_size: usize,
    pub early_stopping_patience: usize,
    pub min_delta: f64,
    pub validation_split: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig::from(&ModelConfig::default())
    }
}

impl From<&ModelConfig> for TrainingConfig {
    fn from(config: &ModelConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            max_epochs: config.epochs,
            batch_size: config.batch_size,
            early_stopping_patience: config.patience,
            min_delta: config.min_delta,
            validation_split: config.validation_split,
        }
    }
}

/// Losses for one epoch, in scaled units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochStats {
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub val_mae: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub history: Vec<EpochStats>,
    /// Epoch whose weights were kept
    pub best_epoch: usize,
    pub best_val_loss: f64,
    pub stopped_early: bool,
    pub train_windows: usize,
    pub validation_windows: usize,
}

impl TrainingReport {
    pub fn epochs_run(&self) -> usize {
        self.history.len()
    }
}

/// Model Trainer
pub struct ModelTrainer {
    config: TrainingConfig,
}

impl ModelTrainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train `model` in place on `windows`. Returns the report and the
    /// validation window range.
    pub fn train(
        &self,
        model: &dyn SequenceModel,
        windows: &SequenceWindows,
    ) -> Result<(TrainingReport, Range<usize>), ModelError> {
        if self.config.batch_size == 0 {
            return Err(ModelError::InvalidConfig("batch_size must be positive".into()));
        }
        if windows.width() != model.input_width() || windows.width() != model.output_width() {
            return Err(ModelError::shape(
                format!("{} features", model.input_width()),
                format!("{} features", windows.width()),
            ));
        }

        let (train_range, val_range) = windows.split(self.config.validation_split)?;
        let device = model.device();
        let train_batches = train_range
            .clone()
            .step_by(self.config.batch_size)
            .map(|start| {
                let end = (start + self.config.batch_size).min(train_range.end);
                windows.tensors(start..end, device)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let (val_x, val_y) = windows.tensors(val_range.clone(), device)?;

        let params = ParamsAdamW {
            lr: self.config.learning_rate,
            weight_decay: 0.0,
            ..Default::default()
        };
        let mut optimizer = AdamW::new(model.varmap().all_vars(), params)?;

        let mut report = TrainingReport {
            best_val_loss: f64::INFINITY,
            train_windows: train_range.len(),
            validation_windows: val_range.len(),
            ..Default::default()
        };
        let mut best_weights = snapshot(model.varmap())?;
        let mut epochs_without_improvement = 0;

        info!(
            train_windows = report.train_windows,
            validation_windows = report.validation_windows,
            max_epochs = self.config.max_epochs,
            "training started"
        );

        for epoch in 0..self.config.max_epochs {
            let mut loss_sum = 0.0;
            for (x, y) in &train_batches {
                let prediction = model.forward_t(x, true)?;
                let batch_loss = loss::mse(&prediction, y)?;
                optimizer.backward_step(&batch_loss)?;
                loss_sum += scalar(&batch_loss)? * x.dim(0)? as f64;
            }
            let train_loss = loss_sum / report.train_windows as f64;

            let val_prediction = model.forward_t(&val_x, false)?;
            let val_loss = scalar(&loss::mse(&val_prediction, &val_y)?)?;
            let val_mae = scalar(&val_prediction.sub(&val_y)?.abs()?.mean_all()?)?;

            debug!(epoch, train_loss, val_loss, val_mae, "epoch finished");
            report.history.push(EpochStats {
                epoch,
                train_loss,
                val_loss,
                val_mae,
            });

            if val_loss < report.best_val_loss - self.config.min_delta {
                report.best_val_loss = val_loss;
                report.best_epoch = epoch;
                best_weights = snapshot(model.varmap())?;
                epochs_without_improvement = 0;
            } else {
                epochs_without_improvement += 1;
                if epochs_without_improvement >= self.config.early_stopping_patience {
                    report.stopped_early = true;
                    info!(
                        epoch,
                        best_epoch = report.best_epoch,
                        best_val_loss = report.best_val_loss,
                        "early stopping"
                    );
                    break;
                }
            }
        }

        restore(model.varmap(), &best_weights)?;
        info!(
            epochs = report.epochs_run(),
            best_epoch = report.best_epoch,
            best_val_loss = report.best_val_loss,
            "training finished"
        );
        Ok((report, val_range))
    }
}

fn scalar(t: &Tensor) -> Result<f64, ModelError> {
    Ok(t.to_dtype(candle_core::DType::F64)?.to_scalar::<f64>()?)
}

fn lock_error() -> ModelError {
    ModelError::Backend(candle_core::Error::Msg("model weights lock poisoned".into()))
}

/// Copy of every trainable tensor
fn snapshot(varmap: &VarMap) -> Result<HashMap<String, Tensor>, ModelError> {
    let vars = varmap.data().lock().map_err(|_| lock_error())?;
    vars.iter()
        .map(|(name, var)| Ok((name.clone(), var.as_tensor().copy()?)))
        .collect()
}

fn restore(varmap: &VarMap, weights: &HashMap<String, Tensor>) -> Result<(), ModelError> {
    let vars = varmap.data().lock().map_err(|_| lock_error())?;
    for (name, var) in vars.iter() {
        if let Some(saved) = weights.get(name) {
            var.set(saved)?;
        }
    }
    Ok(())
}
