//! Energy cost breakdown under a flat or time-of-use tariff

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{FeatureTable, PipelineError};

/// Electricity tariff. Consumption columns are Wh; rates are per kWh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Tariff {
    pub flat_rate_per_kwh: f64,
    pub peak_rate_per_kwh: f64,
    pub off_peak_rate_per_kwh: f64,
    /// First peak hour (inclusive)
    pub peak_start_hour: u32,
    /// Last peak hour (exclusive)
    pub peak_end_hour: u32,
    pub currency: String,
}

impl Default for Tariff {
    fn default() -> Self {
        Self {
            flat_rate_per_kwh: 0.12,
            peak_rate_per_kwh: 0.18,
            off_peak_rate_per_kwh: 0.08,
            peak_start_hour: 8,
            peak_end_hour: 20,
            currency: "USD".to_string(),
        }
    }
}

impl Tariff {
    pub fn is_peak_hour(&self, hour: u32) -> bool {
        if self.peak_start_hour <= self.peak_end_hour {
            hour >= self.peak_start_hour && hour < self.peak_end_hour
        } else {
            // Band wraps midnight
            hour >= self.peak_start_hour || hour < self.peak_end_hour
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquipmentCost {
    pub name: String,
    pub kwh: f64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
    pub currency: String,
    pub total_kwh: f64,
    /// Whole dataset at the flat rate
    pub flat_cost: f64,
    pub peak_kwh: f64,
    pub off_peak_kwh: f64,
    pub peak_cost: f64,
    pub off_peak_cost: f64,
    /// `peak_cost + off_peak_cost`
    pub time_of_use_cost: f64,
    /// Flat cost divided by the number of calendar days covered
    pub average_daily_cost: f64,
    /// Flat-rate cost per metered equipment class plus unattributed load
    pub equipment: Vec<EquipmentCost>,
}

pub fn cost_breakdown(table: &FeatureTable, tariff: &Tariff) -> Result<CostBreakdown, PipelineError> {
    if table.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }

    let hours = table.column("hour")?;
    let consumption = table.column("total_consumption")?;

    let (mut peak_kwh, mut off_peak_kwh) = (0.0, 0.0);
    for (hour, wh) in hours.iter().zip(&consumption) {
        if tariff.is_peak_hour(*hour as u32) {
            peak_kwh += wh / 1000.0;
        } else {
            off_peak_kwh += wh / 1000.0;
        }
    }
    let total_kwh = peak_kwh + off_peak_kwh;
    let flat_cost = total_kwh * tariff.flat_rate_per_kwh;
    let peak_cost = peak_kwh * tariff.peak_rate_per_kwh;
    let off_peak_cost = off_peak_kwh * tariff.off_peak_rate_per_kwh;

    let days = table
        .timestamps()
        .iter()
        .map(|ts| ts.date_naive())
        .collect::<BTreeSet<_>>()
        .len();

    let usage = table.equipment_consumption()?;
    let mut equipment: Vec<EquipmentCost> = usage
        .as_map()
        .into_iter()
        .map(|(name, wh)| EquipmentCost {
            name: name.to_string(),
            kwh: wh / 1000.0,
            cost: wh / 1000.0 * tariff.flat_rate_per_kwh,
        })
        .collect();
    let unattributed_kwh = (total_kwh - usage.total() / 1000.0).max(0.0);
    equipment.push(EquipmentCost {
        name: "Unattributed".to_string(),
        kwh: unattributed_kwh,
        cost: unattributed_kwh * tariff.flat_rate_per_kwh,
    });

    Ok(CostBreakdown {
        currency: tariff.currency.clone(),
        total_kwh,
        flat_cost,
        peak_kwh,
        off_peak_kwh,
        peak_cost,
        off_peak_cost,
        time_of_use_cost: peak_cost + off_peak_cost,
        average_daily_cost: flat_cost / days as f64,
        equipment,
    })
}
