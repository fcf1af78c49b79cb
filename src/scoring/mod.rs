//! Efficiency & Anomaly Scorer
//!
//! Point-in-time efficiency score for the latest period record, z-score anomaly
//! flags over a feature table, and rule-based savings recommendations.

pub mod anomaly;
pub mod efficiency;
pub mod recommendations;

pub use anomaly::*;
pub use efficiency::*;
pub use recommendations::*;

use serde::{Deserialize, Serialize};

/// Reference values the scorer compares readings against
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringContext {
    /// Temperature with no penalty (C)
    pub temperature_setpoint_c: f64,
    /// Deviation from the setpoint at which the temperature score reaches 0 (C)
    pub temperature_tolerance_c: f64,
    /// Per-occupant consumption that earns the full occupancy score (Wh)
    pub per_occupant_reference_wh: f64,
    /// |z| above which a record is anomalous
    pub anomaly_threshold: f64,
}

impl Default for ScoringContext {
    fn default() -> Self {
        Self {
            temperature_setpoint_c: 22.0,
            temperature_tolerance_c: 10.0,
            per_occupant_reference_wh: 1000.0,
            anomaly_threshold: 2.0,
        }
    }
}
