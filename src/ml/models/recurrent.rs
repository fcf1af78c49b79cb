//! Stacked recurrent network on candle

use candle_core::{DType, Device, IndexOp, Tensor};
use candle_nn::{
    gru, linear, lstm, Dropout, GRUConfig, LSTMConfig, Linear, Module, VarBuilder, VarMap, GRU,
    LSTM, RNN,
};
use std::fmt;

use super::{LayerKind, NetworkSpec, SequenceModel};
use crate::ml::ModelError;

enum Cell {
    Lstm(LSTM),
    Gru(GRU),
}

impl Cell {
    /// Hidden states for every timestep, `(batch, seq, width)`
    fn forward_seq(&self, xs: &Tensor) -> candle_core::Result<Tensor> {
        match self {
            Cell::Lstm(cell) => {
                let states = cell.seq(xs)?;
                cell.states_to_tensor(&states)
            }
            Cell::Gru(cell) => {
                let states = cell.seq(xs)?;
                cell.states_to_tensor(&states)
            }
        }
    }
}

struct RecurrentLayer {
    cell: Cell,
    dropout: Dropout,
}

/// Recurrent layers, each followed by dropout, then a linear head over the
/// last timestep
pub struct RecurrentStack {
    layers: Vec<RecurrentLayer>,
    head: Linear,
    varmap: VarMap,
    device: Device,
    spec: NetworkSpec,
    input_width: usize,
    output_width: usize,
}

impl fmt::Debug for RecurrentStack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecurrentStack")
            .field("spec", &self.spec)
            .field("input_width", &self.input_width)
            .field("output_width", &self.output_width)
            .finish()
    }
}

impl SequenceModel for RecurrentStack {
    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let (_batch, seq_len, _features) = xs.dims3()?;
        let mut hidden = xs.clone();
        for layer in &self.layers {
            hidden = layer.cell.forward_seq(&hidden)?;
            hidden = layer.dropout.forward(&hidden, train)?;
        }
        let last = hidden.i((.., seq_len - 1, ..))?.contiguous()?;
        self.head.forward(&last)
    }

    fn input_width(&self) -> usize {
        self.input_width
    }

    fn output_width(&self) -> usize {
        self.output_width
    }

    fn varmap(&self) -> &VarMap {
        &self.varmap
    }

    fn device(&self) -> &Device {
        &self.device
    }

    fn spec(&self) -> &NetworkSpec {
        &self.spec
    }
}

/// Builds a [`RecurrentStack`] from a [`NetworkSpec`]
#[derive(Debug, Clone)]
pub struct SequenceModelBuilder {
    spec: NetworkSpec,
    input_width: usize,
    output_width: Option<usize>,
    device: Device,
}

impl SequenceModelBuilder {
    pub fn new(spec: NetworkSpec, input_width: usize) -> Self {
        Self {
            spec,
            input_width,
            output_width: None,
            device: Device::Cpu,
        }
    }

    /// Head width; defaults to the input width
    pub fn output_width(mut self, width: usize) -> Self {
        self.output_width = Some(width);
        self
    }

    pub fn device(mut self, device: Device) -> Self {
        self.device = device;
        self
    }

    pub fn build(self) -> Result<RecurrentStack, ModelError> {
        self.spec.validate()?;
        if self.input_width == 0 {
            return Err(ModelError::InvalidConfig("input width must be positive".into()));
        }
        let output_width = self.output_width.unwrap_or(self.input_width);

        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &self.device);

        let mut layers = Vec::with_capacity(self.spec.layers().len());
        let mut in_dim = self.input_width;
        for (i, layer) in self.spec.layers().iter().enumerate() {
            let cell = match layer.kind {
                LayerKind::Lstm => Cell::Lstm(lstm(
                    in_dim,
                    layer.width,
                    LSTMConfig::default(),
                    vb.pp(format!("rnn{i}")),
                )?),
                LayerKind::Gru => Cell::Gru(gru(
                    in_dim,
                    layer.width,
                    GRUConfig::default(),
                    vb.pp(format!("rnn{i}")),
                )?),
            };
            layers.push(RecurrentLayer {
                cell,
                dropout: Dropout::new(layer.dropout),
            });
            in_dim = layer.width;
        }
        let head = linear(in_dim, output_width, vb.pp("head"))?;

        Ok(RecurrentStack {
            layers,
            head,
            varmap,
            device: self.device,
            spec: self.spec,
            input_width: self.input_width,
            output_width,
        })
    }
}
