//! Sequence model definitions
//!
//! A network is described by an ordered list of [`LayerSpec`]s and built into a
//! concrete [`SequenceModel`] by [`SequenceModelBuilder`], so depth and widths
//! come from configuration rather than code.

pub mod recurrent;

pub use recurrent::*;

use candle_core::{Device, Tensor};
use candle_nn::VarMap;
use serde::{Deserialize, Serialize};
use strum::Display;

use super::{ModelError, ModelType};

/// Recurrent cell type of one layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LayerKind {
    Lstm,
    Gru,
}

/// One recurrent layer followed by dropout
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerSpec {
    pub kind: LayerKind,
    pub width: usize,
    /// Dropout probability applied to the layer output during training
    pub dropout: f32,
}

impl LayerSpec {
    pub fn lstm(width: usize, dropout: f32) -> Self {
        Self {
            kind: LayerKind::Lstm,
            width,
            dropout,
        }
    }
}

/// Ordered recurrent layers; the output head is added by the builder
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkSpec {
    layers: Vec<LayerSpec>,
}

impl NetworkSpec {
    pub fn new(layers: Vec<LayerSpec>) -> Self {
        Self { layers }
    }

    /// Three LSTM layers of width `units`, `units / 2` and `units / 4`
    pub fn stacked_lstm(units: usize, dropout: f32) -> Self {
        Self::new(
            [units, units / 2, units / 4]
                .into_iter()
                .map(|w| LayerSpec::lstm(w.max(1), dropout))
                .collect(),
        )
    }

    pub fn layers(&self) -> &[LayerSpec] {
        &self.layers
    }

    pub fn model_type(&self) -> ModelType {
        match self.layers.first().map(|l| l.kind) {
            Some(LayerKind::Gru) => ModelType::Gru,
            _ => ModelType::Lstm,
        }
    }

    pub fn validate(&self) -> Result<(), ModelError> {
        if self.layers.is_empty() {
            return Err(ModelError::InvalidConfig("network has no recurrent layers".into()));
        }
        for (i, layer) in self.layers.iter().enumerate() {
            if layer.width == 0 {
                return Err(ModelError::InvalidConfig(format!("layer {i} has zero width")));
            }
            if !(0.0..1.0).contains(&layer.dropout) {
                return Err(ModelError::InvalidConfig(format!(
                    "layer {i} dropout {} outside [0, 1)",
                    layer.dropout
                )));
            }
        }
        Ok(())
    }
}

/// A network mapping `(batch, seq, features)` to the next feature vector
/// `(batch, features)`
pub trait SequenceModel: Send + Sync {
    /// Forward pass; `train` enables dropout
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor>;

    fn input_width(&self) -> usize;

    fn output_width(&self) -> usize;

    /// Trainable parameters
    fn varmap(&self) -> &VarMap;

    fn device(&self) -> &Device;

    fn spec(&self) -> &NetworkSpec;
}
