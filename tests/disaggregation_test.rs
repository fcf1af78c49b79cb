//! Disaggregation driven from serialized catalog input

use building_energy_analytics::disaggregation::{
    estimate_usage, DisaggregationError, DisaggregationSettings, Disaggregator,
};
use building_energy_analytics::domain::{Appliance, UsageConstraints};

#[test]
fn test_two_appliance_scenario_from_json() {
    let appliances: Vec<Appliance> = serde_json::from_str(
        r#"[{"name": "A", "rated_wattage": 100.0}, {"name": "B", "rated_wattage": 1000.0}]"#,
    )
    .unwrap();

    let result = estimate_usage(100.0, &appliances, None).unwrap();
    let a = result.row("A").unwrap();
    let b = result.row("B").unwrap();

    assert!((a.estimated_hours - b.estimated_hours).abs() < 1e-3);
    assert!((result.estimated_total_kwh() - 100.0).abs() < 1e-3 * 100.0);
    assert_eq!(result.period_days, 30.0);
    assert!(result.converged);
}

#[test]
fn test_constraint_map_with_short_keys() {
    let appliances = vec![
        Appliance::new("Refrigerator", 150.0),
        Appliance::new("Television", 100.0),
        Appliance::new("Microwave", 1000.0),
    ];
    let constraints: UsageConstraints = serde_json::from_str(
        r#"{"Refrigerator": {"min": 24, "max": 24}, "Microwave": {"min": 0, "max": 1}}"#,
    )
    .unwrap();

    let result = estimate_usage(150.0, &appliances, Some(&constraints)).unwrap();
    assert!((result.estimated_total_kwh() - 150.0).abs() < 1e-3 * 150.0);

    for row in &result.rows {
        assert!(row.estimated_hours >= row.min_hours - 1e-6);
        assert!(row.estimated_hours <= row.max_hours + 1e-6);
    }
    assert!((result.row("Refrigerator").unwrap().estimated_hours - 720.0).abs() < 1e-6);
    assert!(result.row("Microwave").unwrap().estimated_hours <= 30.0 + 1e-6);
}

#[test]
fn test_infeasible_request_is_not_retried() {
    let appliances = vec![Appliance::new("Heater", 100.0)];
    let constraints: UsageConstraints =
        serde_json::from_str(r#"{"Heater": {"min_hours_per_day": 0, "max_hours_per_day": 1}}"#).unwrap();

    let err = estimate_usage(1000.0, &appliances, Some(&constraints)).unwrap_err();
    match err {
        DisaggregationError::InfeasibleConstraints { target_kwh, max_kwh, .. } => {
            assert_eq!(target_kwh, 1000.0);
            assert!((max_kwh - 3.0).abs() < 1e-9);
        }
        other => panic!("expected infeasible constraints, got {other:?}"),
    }
}

#[test]
fn test_period_length_from_settings() {
    let settings = DisaggregationSettings {
        period_days: 7.0,
        ..DisaggregationSettings::default()
    };
    let appliances = vec![Appliance::new("Fan", 75.0), Appliance::new("Lamp", 25.0)];
    let result = Disaggregator::new(settings).estimate(10.0, &appliances, None).unwrap();

    assert_eq!(result.period_days, 7.0);
    assert!((result.estimated_total_kwh() - 10.0).abs() < 1e-3 * 10.0);
    // Even split: 100 W combined for 100 h, inside the 168 h week
    assert!((result.row("Fan").unwrap().estimated_hours - 100.0).abs() < 1e-3);
}
