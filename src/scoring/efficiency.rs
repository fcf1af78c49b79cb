//! Composite efficiency score

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumIter, IntoEnumIterator};
use tracing::warn;

use super::ScoringContext;
use crate::domain::{PeriodRecord, TimeOfDay};

/// Sub-metrics of the efficiency score
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EfficiencyMetric {
    OccupancyScore,
    PeakLoadScore,
    EquipmentScore,
    TemperatureScore,
    TimeScore,
}

impl EfficiencyMetric {
    /// Maximum points the metric contributes
    pub fn weight(&self) -> f64 {
        match self {
            EfficiencyMetric::OccupancyScore => 30.0,
            EfficiencyMetric::PeakLoadScore => 20.0,
            EfficiencyMetric::EquipmentScore => 20.0,
            EfficiencyMetric::TemperatureScore => 15.0,
            EfficiencyMetric::TimeScore => 15.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EfficiencyScore {
    /// Rounded sum of sub-scores, clamped to 0..=100
    pub score: u8,
    pub breakdown: BTreeMap<EfficiencyMetric, f64>,
    /// Metrics whose ratio had a zero or missing denominator and fell back to 0
    pub degenerate_metrics: Vec<EfficiencyMetric>,
}

impl EfficiencyScore {
    pub fn metric(&self, metric: EfficiencyMetric) -> f64 {
        self.breakdown.get(&metric).copied().unwrap_or(0.0)
    }
}

/// Points for the time-of-day category of the record
pub fn time_of_day_score(time_of_day: TimeOfDay) -> f64 {
    match time_of_day {
        TimeOfDay::Morning => 15.0,
        TimeOfDay::Afternoon => 10.0,
        TimeOfDay::Evening => 5.0,
        _ => 5.0,
    }
}

/// `numerator / denominator`, or `None` when the denominator is zero or the
/// result is not finite
fn ratio(numerator: f64, denominator: f64) -> Option<f64> {
    if denominator == 0.0 {
        return None;
    }
    Some(numerator / denominator).filter(|r| r.is_finite())
}

/// Score one period record, normally the most recent in a dataset.
///
/// A sub-score whose ratio cannot be computed contributes 0 and is listed in
/// `degenerate_metrics`; the other sub-scores are unaffected.
pub fn score_efficiency(record: &PeriodRecord, context: &ScoringContext) -> EfficiencyScore {
    let total = record.total_consumption.unwrap_or(0.0);
    let fan_and_light = record.floor_total();

    let mut breakdown = BTreeMap::new();
    let mut degenerate_metrics = Vec::new();

    for metric in EfficiencyMetric::iter() {
        let value = match metric {
            EfficiencyMetric::OccupancyScore => ratio(total, record.occupancy_level)
                .and_then(|per_occupant| ratio(context.per_occupant_reference_wh, per_occupant))
                .map(|r| (metric.weight() * r).min(metric.weight())),
            // May exceed the weight when peak_load under-reports
            EfficiencyMetric::PeakLoadScore => {
                ratio(total, record.peak_load).map(|r| metric.weight() * r)
            }
            EfficiencyMetric::EquipmentScore => {
                ratio(fan_and_light, total).map(|r| metric.weight() * (1.0 - r))
            }
            EfficiencyMetric::TemperatureScore => {
                ratio(
                    (record.temperature - context.temperature_setpoint_c).abs(),
                    context.temperature_tolerance_c,
                )
                .map(|r| (metric.weight() * (1.0 - r)).max(0.0))
            }
            EfficiencyMetric::TimeScore => Some(time_of_day_score(record.time_of_day)),
        };

        let value = value.unwrap_or_else(|| {
            warn!(
                metric = %metric,
                timestamp = %record.timestamp,
                "degenerate input for efficiency metric; contributing 0"
            );
            degenerate_metrics.push(metric);
            0.0
        });
        breakdown.insert(metric, value);
    }

    let composite = breakdown.values().sum::<f64>().round().clamp(0.0, 100.0);

    EfficiencyScore {
        score: composite as u8,
        breakdown,
        degenerate_metrics,
    }
}

/// Score the record with the latest timestamp in `records`
pub fn score_latest(records: &[PeriodRecord], context: &ScoringContext) -> Option<EfficiencyScore> {
    records
        .iter()
        .max_by_key(|r| crate::pipeline::parse_timestamp(&r.timestamp))
        .map(|latest| score_efficiency(latest, context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::record::fixtures::record;
    use rstest::rstest;

    #[test]
    fn test_reference_record() {
        let score = score_efficiency(&record("2024-03-04T09:00:00", 1000.0), &ScoringContext::default());

        assert_eq!(score.metric(EfficiencyMetric::OccupancyScore), 30.0);
        assert_eq!(score.metric(EfficiencyMetric::PeakLoadScore), 16.0);
        assert!((score.metric(EfficiencyMetric::EquipmentScore) - 14.0).abs() < 1e-9);
        assert_eq!(score.metric(EfficiencyMetric::TemperatureScore), 15.0);
        assert_eq!(score.metric(EfficiencyMetric::TimeScore), 15.0);
        assert_eq!(score.score, 90);
        assert!(score.degenerate_metrics.is_empty());
    }

    #[test]
    fn test_zero_occupancy_contributes_zero() {
        let mut r = record("2024-03-04T09:00:00", 1000.0);
        r.occupancy_level = 0.0;
        let score = score_efficiency(&r, &ScoringContext::default());

        assert_eq!(score.metric(EfficiencyMetric::OccupancyScore), 0.0);
        assert_eq!(score.degenerate_metrics, vec![EfficiencyMetric::OccupancyScore]);
        assert_eq!(score.score, 60);
    }

    #[test]
    fn test_zero_total_consumption() {
        let mut r = record("2024-03-04T09:00:00", 1000.0);
        r.total_consumption = Some(0.0);
        let score = score_efficiency(&r, &ScoringContext::default());

        assert!(score.degenerate_metrics.contains(&EfficiencyMetric::OccupancyScore));
        assert!(score.degenerate_metrics.contains(&EfficiencyMetric::EquipmentScore));
        assert_eq!(score.metric(EfficiencyMetric::PeakLoadScore), 0.0);
        assert_eq!(score.score, 30);
    }

    #[test]
    fn test_zero_peak_load() {
        let mut r = record("2024-03-04T09:00:00", 1000.0);
        r.peak_load = 0.0;
        let score = score_efficiency(&r, &ScoringContext::default());
        assert_eq!(score.degenerate_metrics, vec![EfficiencyMetric::PeakLoadScore]);
        assert_eq!(score.score, 74);
    }

    #[test]
    fn test_composite_is_clamped() {
        let mut r = record("2024-03-04T09:00:00", 1000.0);
        // Under-reported peak pushes the peak sub-score past its weight
        r.peak_load = 100.0;
        let score = score_efficiency(&r, &ScoringContext::default());
        assert_eq!(score.metric(EfficiencyMetric::PeakLoadScore), 200.0);
        assert_eq!(score.score, 100);
    }

    #[rstest]
    #[case(22.0, 15.0)]
    #[case(27.0, 7.5)]
    #[case(17.0, 7.5)]
    #[case(32.0, 0.0)]
    #[case(45.0, 0.0)]
    fn test_temperature_score(#[case] temperature: f64, #[case] expected: f64) {
        let mut r = record("2024-03-04T09:00:00", 1000.0);
        r.temperature = temperature;
        let score = score_efficiency(&r, &ScoringContext::default());
        assert!((score.metric(EfficiencyMetric::TemperatureScore) - expected).abs() < 1e-9);
    }

    #[rstest]
    #[case(TimeOfDay::Morning, 15.0)]
    #[case(TimeOfDay::Afternoon, 10.0)]
    #[case(TimeOfDay::Evening, 5.0)]
    #[case(TimeOfDay::Night, 5.0)]
    #[case(TimeOfDay::Other, 5.0)]
    fn test_time_of_day_lookup(#[case] time_of_day: TimeOfDay, #[case] expected: f64) {
        assert_eq!(time_of_day_score(time_of_day), expected);
    }

    #[test]
    fn test_score_latest_uses_newest_timestamp() {
        let mut newest = record("2024-03-05T09:00:00", 1000.0);
        newest.occupancy_level = 0.0;
        let records = vec![newest, record("2024-03-04T09:00:00", 1000.0)];
        let score = score_latest(&records, &ScoringContext::default()).unwrap();
        assert_eq!(score.score, 60);
        assert!(score_latest(&[], &ScoringContext::default()).is_none());
    }

    #[test]
    fn test_breakdown_serializes_with_metric_names() {
        let score = score_efficiency(&record("2024-03-04T09:00:00", 1000.0), &ScoringContext::default());
        let json = serde_json::to_value(&score).unwrap();
        assert_eq!(json["breakdown"]["occupancy_score"], 30.0);
    }
}
