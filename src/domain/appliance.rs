use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationError};

/// Catalog entry: an appliance and its rated power draw
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct Appliance {
    #[validate(length(min = 1))]
    pub name: String,
    /// Rated power (W), strictly positive
    #[validate(range(exclusive_min = 0.0))]
    pub rated_wattage: f64,
}

impl Appliance {
    pub fn new(name: impl Into<String>, rated_wattage: f64) -> Self {
        Self {
            name: name.into(),
            rated_wattage,
        }
    }
}

/// Known daily operating window for one appliance
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Validate)]
#[validate(schema(function = "validate_constraint_order"))]
pub struct UsageConstraint {
    #[serde(alias = "min")]
    #[validate(range(min = 0.0, max = 24.0))]
    pub min_hours_per_day: f64,
    #[serde(alias = "max")]
    #[validate(range(min = 0.0, max = 24.0))]
    pub max_hours_per_day: f64,
}

impl UsageConstraint {
    pub fn new(min_hours_per_day: f64, max_hours_per_day: f64) -> Self {
        Self {
            min_hours_per_day,
            max_hours_per_day,
        }
    }

    /// Runs around the clock
    pub fn always_on() -> Self {
        Self::new(24.0, 24.0)
    }

    /// Bound on hours over a whole period
    pub fn period_bounds(&self, period_days: f64) -> (f64, f64) {
        (
            self.min_hours_per_day * period_days,
            self.max_hours_per_day * period_days,
        )
    }
}

fn validate_constraint_order(c: &UsageConstraint) -> Result<(), ValidationError> {
    if c.min_hours_per_day > c.max_hours_per_day {
        return Err(ValidationError::new("min_hours_exceeds_max_hours"));
    }
    Ok(())
}

/// Constraints keyed by appliance name
pub type UsageConstraints = BTreeMap<String, UsageConstraint>;
