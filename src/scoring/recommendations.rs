//! Savings recommendations
//!
//! Two sources:
//! - threshold rules over an [`EfficiencyScore`] breakdown
//! - [`RecommendationEngine`], dataset-wide insights with an estimated saving
//!
//! Neither keeps state between calls. Callers that track which insights were
//! already acted on pass that set in.

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use strum::{Display, EnumString};
use tracing::debug;

use super::{EfficiencyMetric, EfficiencyScore, ScoringContext};
use crate::pipeline::{FeatureTable, PipelineError, Tariff};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
pub enum RecommendationCategory {
    Occupancy,
    #[serde(rename = "Peak Load")]
    #[strum(serialize = "Peak Load")]
    PeakLoad,
    Equipment,
    Temperature,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum Priority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub category: RecommendationCategory,
    pub priority: Priority,
    pub suggestion: String,
}

/// Threshold rules over the efficiency breakdown, highest priority first
pub fn recommend_from_breakdown(score: &EfficiencyScore, context: &ScoringContext) -> Vec<Recommendation> {
    let rules = [
        (
            EfficiencyMetric::OccupancyScore,
            20.0,
            RecommendationCategory::Occupancy,
            Priority::High,
            "Consider adjusting HVAC and lighting schedules to better match occupancy patterns".to_string(),
        ),
        (
            EfficiencyMetric::PeakLoadScore,
            15.0,
            RecommendationCategory::PeakLoad,
            Priority::Medium,
            "Implement load shifting strategies to reduce peak demand".to_string(),
        ),
        (
            EfficiencyMetric::EquipmentScore,
            15.0,
            RecommendationCategory::Equipment,
            Priority::High,
            "Review equipment scheduling and consider upgrading to more efficient models".to_string(),
        ),
        (
            EfficiencyMetric::TemperatureScore,
            10.0,
            RecommendationCategory::Temperature,
            Priority::Medium,
            format!(
                "Adjust temperature setpoints closer to the optimal range ({:.0} C)",
                context.temperature_setpoint_c
            ),
        ),
    ];

    rules
        .into_iter()
        .filter(|(metric, threshold, ..)| score.metric(*metric) < *threshold)
        .map(|(_, _, category, priority, suggestion)| Recommendation {
            category,
            priority,
            suggestion,
        })
        .sorted_by_key(|r| r.priority)
        .collect()
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum InsightCategory {
    #[serde(rename = "Peak Usage")]
    #[strum(serialize = "Peak Usage")]
    PeakUsage,
    #[serde(rename = "Equipment Usage")]
    #[strum(serialize = "Equipment Usage")]
    EquipmentUsage,
    #[serde(rename = "Occupancy Optimization")]
    #[strum(serialize = "Occupancy Optimization")]
    OccupancyOptimization,
    #[serde(rename = "After-Hours Usage")]
    #[strum(serialize = "After-Hours Usage")]
    AfterHoursUsage,
    #[serde(rename = "Weekend Efficiency")]
    #[strum(serialize = "Weekend Efficiency")]
    WeekendEfficiency,
    #[serde(rename = "Seasonal Optimization")]
    #[strum(serialize = "Seasonal Optimization")]
    SeasonalOptimization,
    #[serde(rename = "Maintenance Requirements")]
    #[strum(serialize = "Maintenance Requirements")]
    MaintenanceRequirements,
    #[serde(rename = "Cost Optimization")]
    #[strum(serialize = "Cost Optimization")]
    CostOptimization,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
pub enum SavingsUnit {
    WattHoursPerMonth,
    CurrencyPerMonth,
    Percent,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Savings {
    pub amount: f64,
    pub unit: SavingsUnit,
}

impl Savings {
    fn wh_per_month(amount: f64) -> Self {
        Self {
            amount,
            unit: SavingsUnit::WattHoursPerMonth,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub category: InsightCategory,
    pub findings: String,
    pub actions: Vec<String>,
    pub potential_savings: Option<Savings>,
}

impl Insight {
    fn new(category: InsightCategory, findings: String, actions: &[&str], savings: Option<Savings>) -> Self {
        Self {
            category,
            findings,
            actions: actions.iter().map(|a| a.to_string()).collect(),
            potential_savings: savings,
        }
    }

    /// Numeric saving used for ranking; 0 when not estimated
    pub fn savings_amount(&self) -> f64 {
        self.potential_savings.as_ref().map_or(0.0, |s| s.amount)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightReport {
    pub insights: Vec<Insight>,
}

impl InsightReport {
    /// The `n` insights with the largest numeric saving. Amounts are compared
    /// as plain numbers regardless of unit.
    pub fn top_by_savings(&self, n: usize) -> Vec<&Insight> {
        self.insights
            .iter()
            .sorted_by(|a, b| b.savings_amount().total_cmp(&a.savings_amount()))
            .take(n)
            .collect()
    }

    pub fn by_category(&self, category: InsightCategory) -> Vec<&Insight> {
        self.insights.iter().filter(|i| i.category == category).collect()
    }

    pub fn len(&self) -> usize {
        self.insights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insights.is_empty()
    }
}

/// Trigger levels for the dataset rules (consumption in Wh)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InsightThresholds {
    pub computer_mean_wh: f64,
    pub projector_mean_wh: f64,
    pub per_occupant_wh: f64,
    pub after_hours_mean_wh: f64,
    /// Weekend mean above this fraction of the weekday mean
    pub weekend_to_weekday_ratio: f64,
    /// Peak month mean above this multiple of the mean over months
    pub seasonal_peak_ratio: f64,
    /// Relative rise of the last day's mean over the first day's
    pub maintenance_drift: f64,
    /// Rows compared at each end for maintenance drift
    pub drift_window: usize,
    /// Fraction of cost assumed recoverable
    pub cost_saving_fraction: f64,
}

impl Default for InsightThresholds {
    fn default() -> Self {
        Self {
            computer_mean_wh: 500.0,
            projector_mean_wh: 300.0,
            per_occupant_wh: 50.0,
            after_hours_mean_wh: 100.0,
            weekend_to_weekday_ratio: 0.3,
            seasonal_peak_ratio: 1.3,
            maintenance_drift: 0.1,
            drift_window: 24,
            cost_saving_fraction: 0.2,
        }
    }
}

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Rule-based insights over a whole dataset
#[derive(Debug, Clone, Default)]
pub struct RecommendationEngine {
    thresholds: InsightThresholds,
    tariff: Tariff,
}

impl RecommendationEngine {
    pub fn new(tariff: Tariff) -> Self {
        Self {
            thresholds: InsightThresholds::default(),
            tariff,
        }
    }

    pub fn with_thresholds(mut self, thresholds: InsightThresholds) -> Self {
        self.thresholds = thresholds;
        self
    }

    /// Every insight the rules produce for `table`, skipping categories in
    /// `implemented`
    pub fn generate(
        &self,
        table: &FeatureTable,
        implemented: &BTreeSet<InsightCategory>,
    ) -> Result<InsightReport, PipelineError> {
        if table.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }

        let candidates = [
            self.peak_usage(table)?,
            self.equipment_usage(table)?,
            self.occupancy(table)?,
            self.after_hours(table)?,
            self.weekend(table)?,
            self.seasonal(table)?,
            self.maintenance(table)?,
            self.cost(table)?,
        ];

        let insights: Vec<Insight> = candidates
            .into_iter()
            .flatten()
            .filter(|i| !implemented.contains(&i.category))
            .collect();
        debug!(insights = insights.len(), skipped = implemented.len(), "insights generated");
        Ok(InsightReport { insights })
    }

    fn peak_usage(&self, table: &FeatureTable) -> Result<Option<Insight>, PipelineError> {
        let hourly = table.hourly_mean_consumption()?;
        let top: Vec<(u32, f64)> = hourly
            .iter()
            .map(|(h, v)| (*h, *v))
            .sorted_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)))
            .take(3)
            .collect();
        let (Some(top_mean), Some(overall), Some(&(first_hour, _))) =
            (mean(top.iter().map(|t| t.1)), mean(hourly.values().copied()), top.first())
        else {
            return Ok(None);
        };

        Ok(Some(Insight::new(
            InsightCategory::PeakUsage,
            format!(
                "Peak consumption occurs at {}",
                top.iter().map(|(h, _)| format!("{h}:00")).join(", ")
            ),
            &[
                "Consider load balancing during peak hours",
                "Schedule high-consumption tasks during off-peak hours",
                &format!("Reduce non-essential equipment usage during {first_hour}:00"),
            ],
            Some(Savings::wh_per_month((top_mean - overall) * 30.0)),
        )))
    }

    fn equipment_usage(&self, table: &FeatureTable) -> Result<Option<Insight>, PipelineError> {
        let computers = mean(table.column("computer_consumption")?).unwrap_or(0.0);
        let projectors = mean(table.column("projector_consumption")?).unwrap_or(0.0);

        let mut actions = Vec::new();
        if computers > self.thresholds.computer_mean_wh {
            actions.push("Configure computers to enter sleep mode after 15 minutes of inactivity");
        }
        if projectors > self.thresholds.projector_mean_wh {
            actions.push("Install motion sensors for projectors to auto-shutdown when rooms are empty");
        }
        if actions.is_empty() {
            return Ok(None);
        }
        Ok(Some(Insight::new(
            InsightCategory::EquipmentUsage,
            format!("Mean computer load {computers:.2} Wh, projector load {projectors:.2} Wh"),
            &actions,
            None,
        )))
    }

    fn occupancy(&self, table: &FeatureTable) -> Result<Option<Insight>, PipelineError> {
        let consumption = table.column("total_consumption")?;
        let occupancy = table.column("occupancy_level")?;
        // Rows with nobody present have no per-occupant figure
        let per_occupant = mean(
            consumption
                .iter()
                .zip(&occupancy)
                .filter(|(_, o)| **o > 0.0)
                .map(|(c, o)| c / o),
        );
        match per_occupant {
            Some(value) if value > self.thresholds.per_occupant_wh => Ok(Some(Insight::new(
                InsightCategory::OccupancyOptimization,
                format!("Average consumption per occupant: {value:.2} Wh"),
                &[
                    "Implement zone-based lighting controls",
                    "Install occupancy sensors in less frequently used areas",
                    "Optimize HVAC settings based on occupancy patterns",
                ],
                Some(Savings {
                    amount: 20.0,
                    unit: SavingsUnit::Percent,
                }),
            ))),
            _ => Ok(None),
        }
    }

    fn after_hours(&self, table: &FeatureTable) -> Result<Option<Insight>, PipelineError> {
        let hours = table.column("hour")?;
        let consumption = table.column("total_consumption")?;
        let after_hours = mean(
            hours
                .iter()
                .zip(&consumption)
                .filter(|(h, _)| **h >= 18.0 || **h <= 6.0)
                .map(|(_, c)| *c),
        );
        match after_hours {
            Some(value) if value > self.thresholds.after_hours_mean_wh => Ok(Some(Insight::new(
                InsightCategory::AfterHoursUsage,
                format!("Significant after-hours consumption detected: {value:.2} Wh"),
                &[
                    "Implement automatic shutdown procedures for non-essential equipment",
                    "Review and adjust timer settings for all systems",
                    "Consider motion-sensor-based lighting for after-hours operations",
                ],
                Some(Savings::wh_per_month(value * 0.5 * 30.0)),
            ))),
            _ => Ok(None),
        }
    }

    fn weekend(&self, table: &FeatureTable) -> Result<Option<Insight>, PipelineError> {
        let weekend_flags = table.column("is_weekend")?;
        let consumption = table.column("total_consumption")?;
        let (weekend, weekday): (Vec<(f64, f64)>, Vec<(f64, f64)>) = weekend_flags
            .into_iter()
            .zip(consumption)
            .partition(|(w, _)| *w > 0.5);
        let (Some(weekend), Some(weekday)) = (
            mean(weekend.into_iter().map(|(_, c)| c)),
            mean(weekday.into_iter().map(|(_, c)| c)),
        ) else {
            return Ok(None);
        };
        if weekend <= weekday * self.thresholds.weekend_to_weekday_ratio {
            return Ok(None);
        }
        Ok(Some(Insight::new(
            InsightCategory::WeekendEfficiency,
            format!(
                "Weekend consumption ({weekend:.2} Wh) is significant compared to weekday usage ({weekday:.2} Wh)"
            ),
            &[
                "Schedule complete equipment shutdown during weekends",
                "Implement weekend-specific HVAC schedules",
                "Review and optimize weekend security lighting",
                "Consider motion sensors for weekend lighting control",
            ],
            Some(Savings::wh_per_month((weekend - weekday * 0.2) * 8.0)),
        )))
    }

    fn seasonal(&self, table: &FeatureTable) -> Result<Option<Insight>, PipelineError> {
        let monthly = table.monthly_mean_consumption()?;
        let Some((&peak_month, &peak)) = monthly.iter().max_by(|a, b| a.1.total_cmp(b.1)) else {
            return Ok(None);
        };
        let Some(average) = mean(monthly.values().copied()) else {
            return Ok(None);
        };
        if peak <= average * self.thresholds.seasonal_peak_ratio {
            return Ok(None);
        }
        Ok(Some(Insight::new(
            InsightCategory::SeasonalOptimization,
            format!("Peak seasonal consumption in month {peak_month}"),
            &[
                "Adjust HVAC settings based on seasonal weather patterns",
                "Implement seasonal lighting schedules",
                "Consider natural ventilation during moderate weather",
                "Schedule preventive maintenance before peak seasons",
            ],
            Some(Savings::wh_per_month((peak - average) * 30.0)),
        )))
    }

    fn maintenance(&self, table: &FeatureTable) -> Result<Option<Insight>, PipelineError> {
        let consumption = table.column("total_consumption")?;
        let window = self.thresholds.drift_window.min(consumption.len());
        let (Some(past), Some(recent)) = (
            mean(consumption[..window].iter().copied()),
            mean(consumption[consumption.len() - window..].iter().copied()),
        ) else {
            return Ok(None);
        };
        if past <= 0.0 {
            return Ok(None);
        }
        let drift = (recent - past) / past;
        if drift <= self.thresholds.maintenance_drift {
            return Ok(None);
        }
        Ok(Some(Insight::new(
            InsightCategory::MaintenanceRequirements,
            format!("System efficiency has declined by {:.1}%", drift * 100.0),
            &[
                "Schedule comprehensive system maintenance",
                "Clean or replace HVAC filters",
                "Inspect and clean lighting fixtures",
                "Check and calibrate all sensors",
                "Verify equipment operating parameters",
            ],
            Some(Savings::wh_per_month((recent - past) * 30.0)),
        )))
    }

    fn cost(&self, table: &FeatureTable) -> Result<Option<Insight>, PipelineError> {
        let summary = table.summary()?;
        let daily_cost = summary.average_daily_consumption / 1000.0 * self.tariff.flat_rate_per_kwh;
        Ok(Some(Insight::new(
            InsightCategory::CostOptimization,
            format!("Average daily energy cost: {daily_cost:.2} {}", self.tariff.currency),
            &[
                "Negotiate better electricity rates during off-peak hours",
                "Consider solar panel installation for long-term savings",
                "Implement real-time energy monitoring and alerts",
                "Train staff on energy-efficient practices",
            ],
            Some(Savings {
                amount: daily_cost * self.thresholds.cost_saving_fraction * 30.0,
                unit: SavingsUnit::CurrencyPerMonth,
            }),
        )))
    }
}
