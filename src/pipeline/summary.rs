//! Read-only aggregates over a feature table

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};

use super::{FeatureTable, PipelineError};

/// Headline consumption figures for a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsumptionSummary {
    pub record_count: usize,
    /// Sum of total consumption (Wh)
    pub total_consumption: f64,
    /// Mean total consumption per record (Wh)
    pub average_consumption: f64,
    /// Mean over calendar days of each day's summed consumption (Wh)
    pub average_daily_consumption: f64,
    pub peak_consumption: f64,
    pub peak_time: DateTime<FixedOffset>,
    /// Percent
    pub average_occupancy: f64,
}

/// Consumption per equipment class over the dataset (Wh)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EquipmentUsage {
    pub fans: f64,
    pub lights: f64,
    pub computers: f64,
    pub projectors: f64,
}

impl EquipmentUsage {
    pub fn total(&self) -> f64 {
        self.fans + self.lights + self.computers + self.projectors
    }

    pub fn as_map(&self) -> BTreeMap<&'static str, f64> {
        BTreeMap::from([
            ("Fans", self.fans),
            ("Lights", self.lights),
            ("Computers", self.computers),
            ("Projectors", self.projectors),
        ])
    }
}

/// Bucket width for trend views
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum TimeFrame {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl TimeFrame {
    /// First calendar day of the bucket containing `date`; weeks start on Monday
    pub fn bucket_start(&self, date: NaiveDate) -> NaiveDate {
        match self {
            TimeFrame::Daily => date,
            TimeFrame::Weekly => {
                date - Duration::days(date.weekday().num_days_from_monday() as i64)
            }
            TimeFrame::Monthly => date.with_day(1).unwrap_or(date),
            TimeFrame::Yearly => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }
}

/// One resampled bucket of total consumption
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodBucket {
    pub start: NaiveDate,
    pub total: f64,
    pub peak: f64,
    pub mean: f64,
    pub count: usize,
}

/// Trailing window relative to the latest record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
pub enum DateRange {
    #[serde(rename = "1W")]
    #[strum(serialize = "1W")]
    OneWeek,
    #[serde(rename = "1M")]
    #[strum(serialize = "1M")]
    OneMonth,
    #[serde(rename = "3M")]
    #[strum(serialize = "3M")]
    ThreeMonths,
    #[serde(rename = "All")]
    #[strum(serialize = "All")]
    All,
}

impl DateRange {
    pub fn lookback(&self) -> Option<Duration> {
        match self {
            DateRange::OneWeek => Some(Duration::days(7)),
            DateRange::OneMonth => Some(Duration::days(30)),
            DateRange::ThreeMonths => Some(Duration::days(90)),
            DateRange::All => None,
        }
    }

    /// Rows within the window, both ends inclusive
    pub fn apply(&self, table: &FeatureTable) -> FeatureTable {
        let (Some(lookback), Some(end)) = (self.lookback(), table.timestamps().last().copied())
        else {
            return table.clone();
        };
        let start = end - lookback;
        table.filter_rows(|_, ts| *ts >= start && *ts <= end)
    }
}

impl FeatureTable {
    pub fn summary(&self) -> Result<ConsumptionSummary, PipelineError> {
        if self.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let consumption = self.column("total_consumption")?;
        let occupancy = self.column("occupancy_level")?;
        let n = consumption.len() as f64;

        let (peak_index, peak_consumption) = consumption
            .iter()
            .copied()
            .enumerate()
            .fold((0, f64::NEG_INFINITY), |best, (i, v)| if v > best.1 { (i, v) } else { best });

        let daily = self.resample(TimeFrame::Daily)?;
        let average_daily_consumption =
            daily.iter().map(|b| b.total).sum::<f64>() / daily.len() as f64;

        Ok(ConsumptionSummary {
            record_count: consumption.len(),
            total_consumption: consumption.iter().sum(),
            average_consumption: consumption.iter().sum::<f64>() / n,
            average_daily_consumption,
            peak_consumption,
            peak_time: self.timestamps()[peak_index],
            average_occupancy: occupancy.iter().sum::<f64>() / n,
        })
    }

    /// Mean total consumption by hour of day, for hours present in the data
    pub fn hourly_mean_consumption(&self) -> Result<BTreeMap<u32, f64>, PipelineError> {
        let hours = self.column("hour")?;
        let consumption = self.column("total_consumption")?;
        let mut acc: BTreeMap<u32, (f64, usize)> = BTreeMap::new();
        for (hour, value) in hours.iter().zip(&consumption) {
            let entry = acc.entry(*hour as u32).or_default();
            entry.0 += value;
            entry.1 += 1;
        }
        Ok(acc
            .into_iter()
            .map(|(hour, (sum, count))| (hour, sum / count as f64))
            .collect())
    }

    /// Mean total consumption by calendar month
    pub fn monthly_mean_consumption(&self) -> Result<BTreeMap<u32, f64>, PipelineError> {
        let months = self.column("month")?;
        let consumption = self.column("total_consumption")?;
        Ok(months
            .iter()
            .zip(&consumption)
            .map(|(m, v)| (*m as u32, *v))
            .into_group_map()
            .into_iter()
            .map(|(month, values)| (month, values.iter().sum::<f64>() / values.len() as f64))
            .collect())
    }

    pub fn equipment_consumption(&self) -> Result<EquipmentUsage, PipelineError> {
        Ok(EquipmentUsage {
            fans: self.column("total_fan_consumption")?.iter().sum(),
            lights: self.column("total_light_consumption")?.iter().sum(),
            computers: self.column("computer_consumption")?.iter().sum(),
            projectors: self.column("projector_consumption")?.iter().sum(),
        })
    }

    /// Fan plus light consumption per floor over the dataset
    pub fn floor_consumption(&self) -> Result<BTreeMap<u32, f64>, PipelineError> {
        self.floor_ids()
            .iter()
            .map(|&id| {
                let total = self.column(&super::floor_total_column(id))?.iter().sum();
                Ok((id, total))
            })
            .collect()
    }

    /// Total consumption grouped into calendar buckets, in time order
    pub fn resample(&self, frame: TimeFrame) -> Result<Vec<PeriodBucket>, PipelineError> {
        let consumption = self.column("total_consumption")?;
        let buckets = self
            .timestamps()
            .iter()
            .zip(consumption)
            .chunk_by(|(ts, _)| frame.bucket_start(ts.date_naive()))
            .into_iter()
            .map(|(start, group)| {
                let values: Vec<f64> = group.map(|(_, v)| v).collect();
                let total: f64 = values.iter().sum();
                PeriodBucket {
                    start,
                    total,
                    peak: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
                    mean: total / values.len() as f64,
                    count: values.len(),
                }
            })
            .collect();
        Ok(buckets)
    }
}
