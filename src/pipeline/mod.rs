//! Time-series feature pipeline
//!
//! Validates raw period records, flattens nested per-floor and shared-equipment
//! readings into canonical columns and exposes read-only aggregates for the
//! forecasting engine, the scorer and reporting collaborators.

pub mod cost;
pub mod features;
pub mod loader;
pub mod summary;

pub use cost::*;
pub use features::*;
pub use loader::*;
pub use summary::*;

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("malformed record at index {index}: {reason}")]
    MalformedRecord { index: usize, reason: String },

    #[error("no records to process")]
    EmptyDataset,

    #[error("unknown feature column '{0}'")]
    UnknownColumn(String),

    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Body or file is not a JSON document at all
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    #[error("failed to parse {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}
