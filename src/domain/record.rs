use serde::{Deserialize, Serialize};
use std::fmt;
use strum::{Display, EnumString};
use validator::Validate;

/// Coarse time-of-day bucket reported by the building sensors
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum TimeOfDay {
    Morning,
    Afternoon,
    Evening,
    Night,
    /// Any label the sensors emit that we do not recognise
    #[default]
    #[serde(other)]
    Other,
}

/// One floor's sub-metered readings for a sampling interval (Wh)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct FloorReading {
    #[serde(rename = "floor")]
    pub floor_id: u32,
    #[validate(range(min = 0.0))]
    pub fan_consumption: f64,
    #[validate(range(min = 0.0))]
    pub light_consumption: f64,
    /// Reported floor total; the canonical value is always `fan + light`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_floor_consumption: Option<f64>,
}

impl FloorReading {
    pub fn new(floor_id: u32, fan_consumption: f64, light_consumption: f64) -> Self {
        Self {
            floor_id,
            fan_consumption,
            light_consumption,
            total_floor_consumption: Some(fan_consumption + light_consumption),
        }
    }

    pub fn total(&self) -> f64 {
        self.fan_consumption + self.light_consumption
    }

    /// True when the reported total disagrees with `fan + light`
    pub fn total_mismatch(&self) -> bool {
        match self.total_floor_consumption {
            Some(reported) => (reported - self.total()).abs() > 1e-6 * self.total().abs().max(1.0),
            None => false,
        }
    }
}

/// Building-wide equipment that is not attributed to a single floor (Wh)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, Validate)]
pub struct SharedEquipment {
    #[validate(range(min = 0.0))]
    pub computer_consumption: f64,
    #[validate(range(min = 0.0))]
    pub projector_consumption: f64,
}

impl SharedEquipment {
    pub fn total(&self) -> f64 {
        self.computer_consumption + self.projector_consumption
    }
}

/// One timestamped sample of building-wide and per-zone readings.
///
/// `total_consumption` and `floor_data` are optional at the serde level so that a
/// record missing them can still be read and rejected by the feature pipeline
/// with its position in the input, instead of failing the whole batch parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct PeriodRecord {
    pub timestamp: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub day_of_week: Option<String>,
    #[serde(default)]
    pub holiday: bool,
    /// Occupancy as a percentage of building capacity
    #[validate(range(min = 0.0, max = 100.0))]
    pub occupancy_level: f64,
    /// Indoor temperature (Celsius)
    pub temperature: f64,
    #[serde(default)]
    pub time_of_day: TimeOfDay,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_consumption: Option<f64>,
    #[serde(default)]
    pub peak_load: f64,
    #[serde(default)]
    pub break_time_consumption: f64,
    /// Validated per floor by the feature pipeline
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub floor_data: Option<Vec<FloorReading>>,
    #[serde(default)]
    #[validate(nested)]
    pub shared_equipment: SharedEquipment,
}

impl PeriodRecord {
    /// Sum of fan and light consumption over every reported floor
    pub fn floor_total(&self) -> f64 {
        self.floor_data
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(FloorReading::total)
            .sum()
    }

    /// Metered load not explained by floors or shared equipment
    pub fn unattributed_load(&self) -> Option<f64> {
        self.total_consumption
            .map(|total| total - self.floor_total() - self.shared_equipment.total())
    }
}

impl fmt::Display for PeriodRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} occupancy={:.1}% temp={:.1}C total={}",
            self.timestamp,
            self.occupancy_level,
            self.temperature,
            self.total_consumption
                .map(|t| format!("{t:.1}Wh"))
                .unwrap_or_else(|| "n/a".to_string())
        )
    }
}
