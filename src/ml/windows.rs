//! Fixed-length sequence windows over scaled feature rows

use candle_core::{Device, Tensor};
use std::ops::Range;

use super::ModelError;

/// All windows of `sequence_length` consecutive rows, in time order. The
/// label of window `i` is row `i + sequence_length`.
#[derive(Debug, Clone)]
pub struct SequenceWindows {
    rows: Vec<Vec<f64>>,
    sequence_length: usize,
    width: usize,
}

impl SequenceWindows {
    pub fn new(rows: Vec<Vec<f64>>, sequence_length: usize) -> Result<Self, ModelError> {
        if sequence_length == 0 {
            return Err(ModelError::InvalidConfig("sequence_length must be positive".into()));
        }
        if rows.len() <= sequence_length {
            return Err(ModelError::InsufficientData(format!(
                "{} rows yield no windows of length {sequence_length}",
                rows.len()
            )));
        }
        let width = rows[0].len();
        if let Some(bad) = rows.iter().find(|r| r.len() != width) {
            return Err(ModelError::shape(format!("{width} features"), bad.len()));
        }
        Ok(Self {
            rows,
            sequence_length,
            width,
        })
    }

    /// Number of windows, `L - S`
    pub fn len(&self) -> usize {
        self.rows.len() - self.sequence_length
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn sequence_length(&self) -> usize {
        self.sequence_length
    }

    pub fn window(&self, index: usize) -> &[Vec<f64>] {
        &self.rows[index..index + self.sequence_length]
    }

    pub fn label(&self, index: usize) -> &[f64] {
        &self.rows[index + self.sequence_length]
    }

    /// Chronological split: the earliest windows train, the latest validate.
    /// Both sides get at least one window.
    pub fn split(&self, validation_split: f64) -> Result<(Range<usize>, Range<usize>), ModelError> {
        let n = self.len();
        if n < 2 {
            return Err(ModelError::InsufficientData(format!(
                "{n} window(s); need at least 2 for a train/validation split"
            )));
        }
        let train_len = ((n as f64) * (1.0 - validation_split)).floor() as usize;
        let train_len = train_len.clamp(1, n - 1);
        Ok((0..train_len, train_len..n))
    }

    /// Inputs `(batch, S, F)` and labels `(batch, F)` for the windows in `range`
    pub fn tensors(&self, range: Range<usize>, device: &Device) -> Result<(Tensor, Tensor), ModelError> {
        let batch = range.len();
        let mut inputs = Vec::with_capacity(batch * self.sequence_length * self.width);
        let mut labels = Vec::with_capacity(batch * self.width);
        for i in range {
            for row in self.window(i) {
                inputs.extend(row.iter().map(|&v| v as f32));
            }
            labels.extend(self.label(i).iter().map(|&v| v as f32));
        }
        let x = Tensor::from_vec(inputs, (batch, self.sequence_length, self.width), device)?;
        let y = Tensor::from_vec(labels, (batch, self.width), device)?;
        Ok((x, y))
    }
}

/// One window as a `(1, S, F)` tensor
pub fn window_tensor(window: &[Vec<f64>], device: &Device) -> Result<Tensor, ModelError> {
    let width = window.first().map(Vec::len).unwrap_or(0);
    let data: Vec<f32> = window.iter().flatten().map(|&v| v as f32).collect();
    Ok(Tensor::from_vec(data, (1, window.len(), width), device)?)
}
