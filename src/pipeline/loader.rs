//! Loading period records from JSON files on disk

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::PipelineError;
use crate::domain::PeriodRecord;

/// Parse a JSON document holding either one record or an array of records.
/// A record that does not deserialize is reported with its position.
pub fn parse_records(json: &str) -> Result<Vec<PeriodRecord>, PipelineError> {
    let items = match serde_json::from_str::<Value>(json).map_err(PipelineError::InvalidJson)? {
        Value::Array(items) => items,
        other => vec![other],
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value::<PeriodRecord>(item).map_err(|e| PipelineError::MalformedRecord {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

/// Read every `*.json` file in `dir`, in file-name order
pub fn load_records_from_dir(dir: &Path) -> Result<Vec<PeriodRecord>, PipelineError> {
    let io_err = |path: &Path| {
        let path = path.to_path_buf();
        move |source| PipelineError::Io { path, source }
    };

    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(io_err(dir))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    files.sort();

    let mut records = Vec::new();
    for path in &files {
        let raw = fs::read_to_string(path).map_err(io_err(path))?;
        let parsed = parse_records(&raw).map_err(|e| match e {
            PipelineError::InvalidJson(source) => PipelineError::Json {
                path: path.clone(),
                source,
            },
            PipelineError::MalformedRecord { index, reason } => PipelineError::MalformedRecord {
                index: records.len() + index,
                reason: format!("{}: {reason}", path.display()),
            },
            other => other,
        })?;
        debug!(file = %path.display(), records = parsed.len(), "loaded records");
        records.extend(parsed);
    }

    info!(dir = %dir.display(), files = files.len(), records = records.len(), "record directory loaded");
    Ok(records)
}
