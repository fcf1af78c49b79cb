#![allow(dead_code)]

use building_energy_analytics::domain::{FloorReading, PeriodRecord, SharedEquipment, TimeOfDay};
use serde_json::{json, Value};

pub fn timestamp(hour: usize) -> String {
    format!("2024-03-{:02}T{:02}:00:00", 1 + hour / 24, hour % 24)
}

/// Hourly office record; floors and shared equipment scale with `load`
pub fn record(hour: usize, load: f64) -> PeriodRecord {
    PeriodRecord {
        timestamp: timestamp(hour),
        day_of_week: None,
        holiday: false,
        occupancy_level: 40.0,
        temperature: 21.0,
        time_of_day: TimeOfDay::Afternoon,
        total_consumption: Some(load),
        peak_load: load * 1.2,
        break_time_consumption: 0.0,
        floor_data: Some(vec![
            FloorReading::new(1, load * 0.15, load * 0.1),
            FloorReading::new(2, load * 0.1, load * 0.05),
        ]),
        shared_equipment: SharedEquipment {
            computer_consumption: load * 0.3,
            projector_consumption: load * 0.05,
        },
    }
}

/// Daily cycle around 1000 Wh
pub fn daily_cycle(hours: usize) -> Vec<PeriodRecord> {
    (0..hours)
        .map(|h| {
            let load = 1000.0 + 300.0 * ((h % 24) as f64 / 24.0 * std::f64::consts::TAU).sin();
            let mut r = record(h, load);
            r.temperature = 19.0 + (h % 24) as f64 / 6.0;
            r
        })
        .collect()
}

pub fn records_json(records: &[PeriodRecord]) -> Value {
    json!(records)
}
