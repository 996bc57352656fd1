use std::sync::Arc;

use velomodes::{
    calculate_power, calculate_speed, create_mode, solve_cubic, BikeData, BikeType,
    CyclingError, CyclingMode, ManualClock, ModeKind, PhysicsOptions, TrainerClass,
    TrainerProfile, UpdateRequest,
};

fn mode(kind: ModeKind) -> (Box<dyn CyclingMode>, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new());
    let adapter = Arc::new(TrainerProfile::new("Test Trainer", TrainerClass::SimulationTrainer));
    let mode = create_mode(kind, adapter, clock.clone()).unwrap();
    (mode, clock)
}

#[test]
fn cubic_roots_satisfy_equation() {
    for (p, q) in [(-7.0, 6.0), (3.0, -4.0), (-3.0, 2.0), (0.0, 8.0), (-1.0, 5.0), (12.5, 300.0)] {
        let roots = solve_cubic(p, q).unwrap();
        assert!(!roots.is_empty());
        for t in roots {
            let residual = t * t * t + p * t + q;
            assert!(residual.abs() < 1e-6 * (1.0 + q.abs()), "p={p} q={q} t={t}");
        }
    }
}

#[test]
fn speed_and_power_are_inverse() {
    let options = PhysicsOptions::for_bike(BikeType::Race);
    for slope in [0.0, 2.5, 8.0] {
        for power in [50.0, 150.0, 300.0, 600.0] {
            let kmh = calculate_speed(80.0, power, Some(slope), &options).unwrap();
            let back = calculate_power(80.0, kmh / 3.6, Some(slope), &options).unwrap();
            assert!((back - power).abs() < 0.01 * power + 0.5, "slope {slope}, power {power}, got {back}");
        }
    }
}

#[test]
fn reference_rider_speed() {
    let speed = calculate_speed(85.0, 200.0, Some(0.0), &PhysicsOptions::default()).unwrap();
    assert!((30.0..=34.0).contains(&speed), "speed {speed}");
}

#[test]
fn negative_inputs_rejected() {
    let options = PhysicsOptions::default();
    assert!(matches!(
        calculate_speed(-1.0, 200.0, None, &options),
        Err(CyclingError::IllegalArgument(_))
    ));
    assert!(matches!(
        calculate_speed(80.0, -5.0, None, &options),
        Err(CyclingError::IllegalArgument(_))
    ));
    assert!(matches!(
        calculate_power(80.0, -1.0, None, &options),
        Err(CyclingError::IllegalArgument(_))
    ));
}

#[test]
fn erg_min_power_above_device_power() {
    let (mut erg, _clock) = mode(ModeKind::Erg);
    erg.update_data(&BikeData::sample(80.0, 90.0, 0.0));
    let request = UpdateRequest {
        min_power: Some(100.0),
        ..UpdateRequest::default()
    };
    let normalized = erg.send_bike_update(&request);
    assert_eq!(normalized.target_power, Some(100.0));
    assert!(normalized.slope.is_none());
}

#[test]
fn erg_refresh_on_fresh_mode_sends_start_power() {
    let (mut erg, _clock) = mode(ModeKind::Erg);
    for _ in 0..2 {
        let normalized = erg.send_bike_update(&UpdateRequest::refresh());
        assert_eq!(normalized.target_power, Some(50.0));
    }
}

#[test]
fn smart_trainer_skips_target_already_reached() {
    let (mut st, _clock) = mode(ModeKind::SmartTrainer);
    st.update_data(&BikeData::sample(150.0, 90.0, 0.0));
    let normalized = st.send_bike_update(&UpdateRequest::target_power(150.0));
    assert!(normalized.target_power.is_none());
}

#[test]
fn power_meter_coasts_down_when_pedalling_stops() {
    let (mut meter, clock) = mode(ModeKind::PowerMeter);
    let riding = BikeData::sample(220.0, 90.0, 0.0);
    meter.update_data(&riding);
    for _ in 0..30 {
        clock.advance_secs(1);
        meter.update_data(&riding);
    }
    let before = meter.data().unwrap().speed;

    clock.advance_secs(1);
    let after = meter.update_data(&BikeData {
        is_pedalling: false,
        ..BikeData::sample(220.0, 0.0, 0.0)
    });
    assert!(after.power.abs() < f64::EPSILON);
    assert!(after.speed < before);
}

#[test]
fn distance_never_decreases_until_reset() {
    for kind in [
        ModeKind::PowerMeter,
        ModeKind::SmartTrainer,
        ModeKind::Erg,
        ModeKind::AdvancedSimulation,
    ] {
        let (mut mode, clock) = mode(kind);
        let mut distance = 0.0;
        for (i, power) in [150.0, 220.0, 0.0, 90.0, 310.0, 0.0, 180.0].iter().enumerate() {
            match i {
                1 => mode.send_bike_update(&UpdateRequest::slope(-2.0)),
                4 => mode.send_bike_update(&UpdateRequest::slope(3.0)),
                _ => UpdateRequest::default(),
            };
            clock.advance_secs(1);
            let rpm = if *power > 0.0 { 85.0 } else { 0.0 };
            let data = mode.update_data(&BikeData::sample(*power, rpm, 0.0));
            assert!(data.distance_internal >= distance, "{kind}: distance went backwards");
            distance = data.distance_internal;
        }
        assert!(distance > 0.0, "{kind}: no distance covered");

        mode.send_bike_update(&UpdateRequest::reset());
        assert!(mode.data().is_none());
        let data = mode.update_data(&BikeData::sample(150.0, 85.0, 0.0));
        assert!(data.distance_internal.abs() < f64::EPSILON, "{kind}: distance kept after reset");
    }
}

#[test]
fn factory_respects_trainer_class() {
    let clock = Arc::new(ManualClock::new());
    let meter = Arc::new(TrainerProfile::new("Meter", TrainerClass::PowerMeter));
    assert!(matches!(
        create_mode(ModeKind::Erg, meter.clone(), clock.clone()),
        Err(CyclingError::UnsupportedMode(_))
    ));
    let mode = create_mode(ModeKind::PowerMeter, meter, clock).unwrap();
    assert_eq!(mode.kind(), ModeKind::PowerMeter);
}
