//! Feature engineering for building consumption records
//!
//! Turns an ordered sequence of period records into a flat numeric table with
//! calendar features and one fan/light column pair per floor seen in the data.

use chrono::{DateTime, Datelike, FixedOffset, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::{debug, info, warn};
use validator::Validate;

use super::PipelineError;
use crate::domain::{PeriodRecord, TimeOfDay};

/// Columns present in every table, in order, before the per-floor columns
pub const BASE_COLUMNS: [&str; 11] = [
    "hour",
    "day",
    "month",
    "day_of_week",
    "is_weekend",
    "holiday",
    "occupancy_level",
    "temperature",
    "total_consumption",
    "peak_load",
    "break_time_consumption",
];

/// Aggregate columns appended after the per-floor columns
pub const AGGREGATE_COLUMNS: [&str; 4] = [
    "total_fan_consumption",
    "total_light_consumption",
    "computer_consumption",
    "projector_consumption",
];

const NAIVE_FORMATS: [&str; 6] = [
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Calendar features derived from a timestamp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalFeatures {
    /// Hour of day (0-23)
    pub hour: u32,
    /// Day of month (1-31)
    pub day: u32,
    /// Month (1-12)
    pub month: u32,
    /// Day of week (0=Monday, 6=Sunday)
    pub day_of_week: u32,
    /// Saturday or Sunday
    pub is_weekend: bool,
}

impl TemporalFeatures {
    /// Calendar fields in the timestamp's own offset; no timezone conversion
    pub fn from_timestamp(timestamp: &DateTime<FixedOffset>) -> Self {
        let day_of_week = timestamp.weekday().num_days_from_monday();
        Self {
            hour: timestamp.hour(),
            day: timestamp.day(),
            month: timestamp.month(),
            day_of_week,
            is_weekend: day_of_week >= 5,
        }
    }
}

/// Parse RFC 3339, or a naive date-time which is taken as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<FixedOffset>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc3339(raw).ok().or_else(|| {
        NAIVE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
            .map(|naive| naive.and_utc().fixed_offset())
    })
}

pub fn floor_fan_column(floor_id: u32) -> String {
    format!("floor_{floor_id}_fan")
}

pub fn floor_light_column(floor_id: u32) -> String {
    format!("floor_{floor_id}_light")
}

pub fn floor_total_column(floor_id: u32) -> String {
    format!("floor_{floor_id}_total")
}

/// Flat numeric table built from period records, one row per record in
/// timestamp order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeatureTable {
    timestamps: Vec<DateTime<FixedOffset>>,
    time_of_day: Vec<TimeOfDay>,
    floor_ids: Vec<u32>,
    columns: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl FeatureTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn floor_ids(&self) -> &[u32] {
        &self.floor_ids
    }

    pub fn timestamps(&self) -> &[DateTime<FixedOffset>] {
        &self.timestamps
    }

    pub fn time_of_day(&self) -> &[TimeOfDay] {
        &self.time_of_day
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> Option<&[f64]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    pub fn column_index(&self, name: &str) -> Result<usize, PipelineError> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| PipelineError::UnknownColumn(name.to_string()))
    }

    pub fn column(&self, name: &str) -> Result<Vec<f64>, PipelineError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.iter().map(|r| r[idx]).collect())
    }

    pub fn value(&self, row: usize, name: &str) -> Result<Option<f64>, PipelineError> {
        let idx = self.column_index(name)?;
        Ok(self.rows.get(row).map(|r| r[idx]))
    }

    /// Project the table onto `names`, in that order
    pub fn select<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<Vec<f64>>, PipelineError> {
        let indices = names
            .iter()
            .map(|n| self.column_index(n.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i]).collect())
            .collect())
    }

    /// Rows whose index satisfies `keep`, as a new table
    pub fn filter_rows(&self, mut keep: impl FnMut(usize, &DateTime<FixedOffset>) -> bool) -> Self {
        let selected: Vec<usize> = self
            .timestamps
            .iter()
            .enumerate()
            .filter(|(i, ts)| keep(*i, ts))
            .map(|(i, _)| i)
            .collect();
        Self {
            timestamps: selected.iter().map(|&i| self.timestamps[i]).collect(),
            time_of_day: selected.iter().map(|&i| self.time_of_day[i]).collect(),
            floor_ids: self.floor_ids.clone(),
            columns: self.columns.clone(),
            rows: selected.iter().map(|&i| self.rows[i].clone()).collect(),
        }
    }
}

struct ValidatedRecord<'a> {
    index: usize,
    timestamp: DateTime<FixedOffset>,
    total_consumption: f64,
    record: &'a PeriodRecord,
}

fn malformed(index: usize, reason: impl Into<String>) -> PipelineError {
    PipelineError::MalformedRecord {
        index,
        reason: reason.into(),
    }
}

fn validate_record(index: usize, record: &PeriodRecord) -> Result<ValidatedRecord<'_>, PipelineError> {
    let timestamp = parse_timestamp(&record.timestamp)
        .ok_or_else(|| malformed(index, format!("unparseable timestamp '{}'", record.timestamp)))?;

    let total_consumption = record
        .total_consumption
        .ok_or_else(|| malformed(index, "missing total_consumption"))?;
    if !total_consumption.is_finite() || total_consumption < 0.0 {
        return Err(malformed(
            index,
            format!("total_consumption must be a non-negative number, got {total_consumption}"),
        ));
    }

    let floors = record
        .floor_data
        .as_ref()
        .ok_or_else(|| malformed(index, "missing floor_data"))?;

    record
        .validate()
        .map_err(|e| malformed(index, e.to_string()))?;

    let mut seen = HashSet::new();
    for floor in floors {
        floor
            .validate()
            .map_err(|e| malformed(index, format!("floor {}: {e}", floor.floor_id)))?;
        if !seen.insert(floor.floor_id) {
            return Err(malformed(index, format!("floor {} reported twice", floor.floor_id)));
        }
        if floor.total_mismatch() {
            warn!(
                index,
                floor = floor.floor_id,
                reported = ?floor.total_floor_consumption,
                computed = floor.total(),
                "floor total disagrees with fan + light; using fan + light"
            );
        }
    }

    Ok(ValidatedRecord {
        index,
        timestamp,
        total_consumption,
        record,
    })
}

/// Build the feature table for a sequence of period records.
///
/// Records are ordered by timestamp (stable). Every floor id seen anywhere in
/// the input gets its own columns; records that do not report a floor get 0
/// for it.
pub fn build_feature_table(records: &[PeriodRecord]) -> Result<FeatureTable, PipelineError> {
    if records.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }

    let mut validated = records
        .iter()
        .enumerate()
        .map(|(index, record)| validate_record(index, record))
        .collect::<Result<Vec<_>, _>>()?;

    validated.sort_by_key(|v| v.timestamp);
    for pair in validated.windows(2) {
        if pair[0].timestamp == pair[1].timestamp {
            return Err(malformed(
                pair[0].index.max(pair[1].index),
                format!("duplicate timestamp {}", pair[1].timestamp.to_rfc3339()),
            ));
        }
    }

    let floor_ids: Vec<u32> = validated
        .iter()
        .flat_map(|v| v.record.floor_data.iter().flatten().map(|f| f.floor_id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    for &floor_id in &floor_ids {
        columns.push(floor_fan_column(floor_id));
        columns.push(floor_light_column(floor_id));
        columns.push(floor_total_column(floor_id));
    }
    columns.extend(AGGREGATE_COLUMNS.iter().map(|c| c.to_string()));

    let rows = validated
        .iter()
        .map(|v| tabulate(v, &floor_ids, columns.len()))
        .collect();

    let table = FeatureTable {
        timestamps: validated.iter().map(|v| v.timestamp).collect(),
        time_of_day: validated.iter().map(|v| v.record.time_of_day).collect(),
        floor_ids,
        columns,
        rows,
    };

    info!(
        records = table.len(),
        floors = table.floor_ids.len(),
        columns = table.columns.len(),
        "feature table built"
    );
    Ok(table)
}

fn tabulate(v: &ValidatedRecord<'_>, floor_ids: &[u32], width: usize) -> Vec<f64> {
    let record = v.record;
    let calendar = TemporalFeatures::from_timestamp(&v.timestamp);

    let mut row = Vec::with_capacity(width);
    row.extend([
        calendar.hour as f64,
        calendar.day as f64,
        calendar.month as f64,
        calendar.day_of_week as f64,
        if calendar.is_weekend { 1.0 } else { 0.0 },
        if record.holiday { 1.0 } else { 0.0 },
        record.occupancy_level,
        record.temperature,
        v.total_consumption,
        record.peak_load,
        record.break_time_consumption,
    ]);

    let floors = record.floor_data.as_deref().unwrap_or_default();
    let (mut fan_total, mut light_total) = (0.0, 0.0);
    for &floor_id in floor_ids {
        let (fan, light) = floors
            .iter()
            .find(|f| f.floor_id == floor_id)
            .map(|f| (f.fan_consumption, f.light_consumption))
            .unwrap_or((0.0, 0.0));
        fan_total += fan;
        light_total += light;
        row.extend([fan, light, fan + light]);
    }

    row.extend([
        fan_total,
        light_total,
        record.shared_equipment.computer_consumption,
        record.shared_equipment.projector_consumption,
    ]);

    if let Some(excess) = record.unattributed_load().filter(|load| *load < -1e-6) {
        debug!(
            index = v.index,
            excess = -excess,
            "sub-readings exceed metered total"
        );
    }
    row
}
