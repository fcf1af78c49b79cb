//! Appliance usage disaggregation
//!
//! Infers how many hours each appliance ran over a billing period from the
//! metered total. The model is deliberately simple: usage is spread as evenly
//! as possible across appliances, subject to known daily operating windows and
//! the hard requirement that the estimates reproduce the metered energy.

pub mod solver;

pub use solver::*;

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, warn};
use validator::Validate;

use crate::domain::{Appliance, UsageConstraints};

/// Default initial guess, hours per day
const INITIAL_HOURS_PER_DAY: f64 = 8.0;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DisaggregationError {
    #[error(
        "infeasible disaggregation: target {target_kwh:.3} kWh outside reachable range [{min_kwh:.3}, {max_kwh:.3}] kWh"
    )]
    InfeasibleConstraints {
        target_kwh: f64,
        min_kwh: f64,
        max_kwh: f64,
    },

    #[error("invalid disaggregation input: {0}")]
    InvalidInput(String),

    #[error("solver residual {residual:.3e} kWh exceeds tolerance after {iterations} iterations")]
    NotConverged { iterations: usize, residual: f64 },
}

/// Solver settings that are not part of the problem data
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisaggregationSettings {
    /// Length of the billing period in days
    pub period_days: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
    /// Allowed relative error on the energy balance
    pub balance_tolerance: f64,
}

impl Default for DisaggregationSettings {
    fn default() -> Self {
        Self {
            period_days: 30.0,
            max_iterations: 20_000,
            tolerance: 1e-9,
            balance_tolerance: 1e-6,
        }
    }
}

/// Problem data in solver-ready form, one entry per appliance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageProblem {
    pub names: Vec<String>,
    pub wattages: Vec<f64>,
    /// Hours over the whole period
    pub lower: Vec<f64>,
    pub upper: Vec<f64>,
    pub target_kwh: f64,
    pub initial: Vec<f64>,
}

impl UsageProblem {
    pub fn build(
        total_kwh: f64,
        appliances: &[Appliance],
        constraints: Option<&UsageConstraints>,
        period_days: f64,
    ) -> Result<Self, DisaggregationError> {
        if !total_kwh.is_finite() || total_kwh <= 0.0 {
            return Err(DisaggregationError::InvalidInput(format!(
                "total energy must be positive, got {total_kwh}"
            )));
        }
        if !period_days.is_finite() || period_days <= 0.0 {
            return Err(DisaggregationError::InvalidInput(format!(
                "period length must be positive, got {period_days} days"
            )));
        }
        if appliances.is_empty() {
            return Err(DisaggregationError::InvalidInput(
                "appliance catalog is empty".to_string(),
            ));
        }

        let mut seen = HashSet::new();
        for appliance in appliances {
            appliance.validate().map_err(|e| {
                DisaggregationError::InvalidInput(format!("appliance '{}': {e}", appliance.name))
            })?;
            if !seen.insert(appliance.name.as_str()) {
                return Err(DisaggregationError::InvalidInput(format!(
                    "duplicate appliance '{}'",
                    appliance.name
                )));
            }
        }

        if let Some(constraints) = constraints {
            for (name, constraint) in constraints {
                constraint.validate().map_err(|e| {
                    DisaggregationError::InvalidInput(format!("constraint for '{name}': {e}"))
                })?;
                if !seen.contains(name.as_str()) {
                    warn!(appliance = %name, "constraint names an appliance missing from the catalog; ignored");
                }
            }
        }

        let default_bounds = (0.0, 24.0 * period_days);
        let (lower, upper): (Vec<f64>, Vec<f64>) = appliances
            .iter()
            .map(|a| {
                constraints
                    .and_then(|c| c.get(&a.name))
                    .map(|c| c.period_bounds(period_days))
                    .unwrap_or(default_bounds)
            })
            .unzip();

        let initial = lower
            .iter()
            .zip(&upper)
            .map(|(lo, hi)| (INITIAL_HOURS_PER_DAY * period_days).clamp(*lo, *hi))
            .collect();

        Ok(Self {
            names: appliances.iter().map(|a| a.name.clone()).collect(),
            wattages: appliances.iter().map(|a| a.rated_wattage).collect(),
            lower,
            upper,
            target_kwh: total_kwh,
            initial,
        })
    }
}

/// One row of the disaggregation report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisaggregationRow {
    pub appliance_name: String,
    pub wattage: f64,
    /// Hours over the whole period
    pub estimated_hours: f64,
    pub estimated_kwh: f64,
    pub percentage_of_total: f64,
    pub min_hours: f64,
    pub max_hours: f64,
}

/// Full disaggregation report, rows sorted by energy descending
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisaggregationResult {
    pub total_kwh: f64,
    pub period_days: f64,
    pub rows: Vec<DisaggregationRow>,
    pub solver: String,
    pub iterations: usize,
    pub converged: bool,
}

impl DisaggregationResult {
    pub fn estimated_total_kwh(&self) -> f64 {
        self.rows.iter().map(|r| r.estimated_kwh).sum()
    }

    pub fn row(&self, appliance_name: &str) -> Option<&DisaggregationRow> {
        self.rows.iter().find(|r| r.appliance_name == appliance_name)
    }
}

/// Disaggregation front end; pairs a solver strategy with period settings
pub struct Disaggregator {
    pub strategy: Box<dyn DisaggregationStrategy>,
    pub settings: DisaggregationSettings,
}

impl Default for Disaggregator {
    fn default() -> Self {
        Self::new(DisaggregationSettings::default())
    }
}

impl Disaggregator {
    pub fn new(settings: DisaggregationSettings) -> Self {
        Self {
            strategy: Box::new(ProjectedGradientSolver::new(
                settings.max_iterations,
                settings.tolerance,
            )),
            settings,
        }
    }

    pub fn with_strategy(mut self, strategy: Box<dyn DisaggregationStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn estimate(
        &self,
        total_kwh: f64,
        appliances: &[Appliance],
        constraints: Option<&UsageConstraints>,
    ) -> Result<DisaggregationResult, DisaggregationError> {
        let problem =
            UsageProblem::build(total_kwh, appliances, constraints, self.settings.period_days)?;
        let outcome = self.strategy.solve(&problem)?;

        let mut rows: Vec<DisaggregationRow> = problem
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| {
                let hours = outcome.hours[i];
                let kwh = problem.wattages[i] * hours / 1000.0;
                DisaggregationRow {
                    appliance_name: name.clone(),
                    wattage: problem.wattages[i],
                    estimated_hours: hours,
                    estimated_kwh: kwh,
                    percentage_of_total: kwh / total_kwh * 100.0,
                    min_hours: problem.lower[i],
                    max_hours: problem.upper[i],
                }
            })
            .collect();

        let residual = (rows.iter().map(|r| r.estimated_kwh).sum::<f64>() - total_kwh).abs();
        if residual > self.settings.balance_tolerance * total_kwh {
            return Err(DisaggregationError::NotConverged {
                iterations: outcome.iterations,
                residual,
            });
        }

        rows.sort_by(|a, b| b.estimated_kwh.total_cmp(&a.estimated_kwh));

        info!(
            appliances = rows.len(),
            total_kwh,
            iterations = outcome.iterations,
            solver = self.strategy.name(),
            "usage disaggregated"
        );

        Ok(DisaggregationResult {
            total_kwh,
            period_days: self.settings.period_days,
            rows,
            solver: self.strategy.name().to_string(),
            iterations: outcome.iterations,
            converged: outcome.converged,
        })
    }
}

/// Estimate per-appliance usage over a 30-day period with default settings
pub fn estimate_usage(
    total_kwh: f64,
    appliances: &[Appliance],
    constraints: Option<&UsageConstraints>,
) -> Result<DisaggregationResult, DisaggregationError> {
    Disaggregator::default().estimate(total_kwh, appliances, constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UsageConstraint;
    use proptest::prelude::*;

    fn household() -> Vec<Appliance> {
        vec![
            Appliance::new("Refrigerator", 150.0),
            Appliance::new("Air Conditioner", 1500.0),
            Appliance::new("Television", 100.0),
            Appliance::new("Washing Machine", 500.0),
            Appliance::new("Fan", 75.0),
            Appliance::new("LED Bulb", 9.0),
            Appliance::new("Microwave", 1000.0),
            Appliance::new("Water Heater", 2000.0),
        ]
    }

    fn household_constraints() -> UsageConstraints {
        UsageConstraints::from([
            ("Refrigerator".to_string(), UsageConstraint::always_on()),
            ("Fan".to_string(), UsageConstraint::new(6.0, 12.0)),
            ("LED Bulb".to_string(), UsageConstraint::new(4.0, 8.0)),
        ])
    }

    #[test]
    fn test_two_appliances_share_hours_evenly() {
        let appliances = vec![Appliance::new("A", 100.0), Appliance::new("B", 1000.0)];
        let result = estimate_usage(100.0, &appliances, None).unwrap();

        let a = result.row("A").unwrap();
        let b = result.row("B").unwrap();
        assert!((a.estimated_hours - b.estimated_hours).abs() < 1e-3);
        assert!((a.estimated_hours - 100.0 / 1.1).abs() < 1e-3);
        assert!((result.estimated_total_kwh() - 100.0).abs() < 1e-6 * 100.0);
        // Sorted by energy descending
        assert_eq!(result.rows[0].appliance_name, "B");
    }

    #[test]
    fn test_household_with_constraints() {
        let result = estimate_usage(300.0, &household(), Some(&household_constraints())).unwrap();

        assert!((result.estimated_total_kwh() - 300.0).abs() < 1e-3);
        let fridge = result.row("Refrigerator").unwrap();
        assert!((fridge.estimated_hours - 720.0).abs() < 1e-9);
        let fan = result.row("Fan").unwrap();
        assert!(fan.estimated_hours >= 180.0 - 1e-9 && fan.estimated_hours <= 360.0 + 1e-9);

        let pct: f64 = result.rows.iter().map(|r| r.percentage_of_total).sum();
        assert!((pct - 100.0).abs() < 1e-3);
        for pair in result.rows.windows(2) {
            assert!(pair[0].estimated_kwh >= pair[1].estimated_kwh);
        }
    }

    #[test]
    fn test_infeasible_single_appliance() {
        let appliances = vec![Appliance::new("Heater", 100.0)];
        let constraints =
            UsageConstraints::from([("Heater".to_string(), UsageConstraint::new(0.0, 1.0))]);
        let err = estimate_usage(1000.0, &appliances, Some(&constraints)).unwrap_err();
        assert!(matches!(err, DisaggregationError::InfeasibleConstraints { .. }));
    }

    #[test]
    fn test_rejects_bad_input() {
        let appliances = vec![Appliance::new("A", 100.0), Appliance::new("A", 50.0)];
        assert!(matches!(
            estimate_usage(10.0, &appliances, None),
            Err(DisaggregationError::InvalidInput(_))
        ));
        assert!(matches!(
            estimate_usage(-1.0, &[Appliance::new("A", 1.0)], None),
            Err(DisaggregationError::InvalidInput(_))
        ));
        assert!(matches!(
            estimate_usage(1.0, &[], None),
            Err(DisaggregationError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_initial_guess_clipped_into_bounds() {
        let appliances = vec![Appliance::new("Fridge", 150.0), Appliance::new("Lamp", 10.0)];
        let constraints =
            UsageConstraints::from([("Fridge".to_string(), UsageConstraint::always_on())]);
        let problem = UsageProblem::build(200.0, &appliances, Some(&constraints), 30.0).unwrap();
        assert_eq!(problem.initial, vec![720.0, 240.0]);
        assert_eq!(problem.upper, vec![720.0, 720.0]);
    }

    #[test]
    fn test_custom_period_length() {
        let settings = DisaggregationSettings {
            period_days: 7.0,
            ..Default::default()
        };
        let appliances = vec![Appliance::new("A", 1000.0)];
        let result = Disaggregator::new(settings)
            .estimate(14.0, &appliances, None)
            .unwrap();
        assert!((result.rows[0].estimated_hours - 14.0).abs() < 1e-6);
        assert_eq!(result.rows[0].max_hours, 168.0);
    }

    fn catalog_strategy() -> impl Strategy<Value = (Vec<(f64, Option<(f64, f64)>)>, f64)> {
        (
            prop::collection::vec(
                (
                    5.0f64..3000.0,
                    prop::option::of((0.0f64..12.0, 0.0f64..12.0)),
                ),
                1..7,
            ),
            0.05f64..0.95,
        )
    }

    proptest! {
        #[test]
        fn prop_estimates_balance_and_respect_bounds((entries, fraction) in catalog_strategy()) {
            let appliances: Vec<Appliance> = entries
                .iter()
                .enumerate()
                .map(|(i, (watts, _))| Appliance::new(format!("appliance_{i}"), *watts))
                .collect();
            let constraints: UsageConstraints = entries
                .iter()
                .enumerate()
                .filter_map(|(i, (_, c))| {
                    c.map(|(a, b)| (format!("appliance_{i}"), UsageConstraint::new(a, a + b)))
                })
                .collect();

            let problem = UsageProblem::build(1.0, &appliances, Some(&constraints), 30.0).unwrap();
            let min_kwh: f64 = problem.wattages.iter().zip(&problem.lower).map(|(w, h)| w * h / 1000.0).sum();
            let max_kwh: f64 = problem.wattages.iter().zip(&problem.upper).map(|(w, h)| w * h / 1000.0).sum();
            prop_assume!(max_kwh - min_kwh > 1e-3);
            let total = min_kwh + fraction * (max_kwh - min_kwh);
            prop_assume!(total > 0.0);

            let result = estimate_usage(total, &appliances, Some(&constraints)).unwrap();
            prop_assert!((result.estimated_total_kwh() - total).abs() <= 1e-3 * total);
            for row in &result.rows {
                prop_assert!(row.estimated_hours >= row.min_hours - 1e-6);
                prop_assert!(row.estimated_hours <= row.max_hours + 1e-6);
            }
        }
    }
}
