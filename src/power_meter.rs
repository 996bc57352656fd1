use std::sync::Arc;
use tracing::debug;

use crate::{
    adapter::DeviceAdapter,
    clock::Clock,
    error::Result,
    mode::{bike_type_property, empty_on_error, freeze_on_error, CyclingMode, ModeState},
    physics::{calculate_power, calculate_speed},
    types::{kmh_to_mps, mps_to_kmh, BikeData, ModeKind, UpdateRequest},
};

/// Longest interval in seconds integrated in one energy step
pub const MAX_STEP: f64 = 1.0;

/// Mode for devices that only report power
///
/// Nothing is ever sent to the device. Speed follows a kinetic energy balance:
/// the power needed to hold the previous speed is compared with the delivered
/// power, and the difference over the elapsed time is added to or taken from
/// the rider's kinetic energy. Long gaps between samples are integrated in
/// steps of at most [`MAX_STEP`].
pub struct PowerMeterMode {
    state: ModeState,
}

impl PowerMeterMode {
    /// Mode for the given adapter
    #[must_use]
    pub fn new(adapter: Arc<dyn DeviceAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: ModeState::new(adapter, clock, vec![bike_type_property()]),
        }
    }

    fn integrate(&mut self, raw: &BikeData) -> Result<BikeData> {
        raw.validate()?;
        let elapsed = self.state.elapsed();
        let power = if raw.is_idle() { 0.0 } else { raw.power };
        let mass = self.state.weight();

        let speed = match self.state.data() {
            None => 0.0,
            Some(prev) => {
                let slope = prev.slope.unwrap_or(0.0);
                let options = self.state.physics_options();
                let steady = kmh_to_mps(calculate_speed(mass, power, Some(slope), &options)?);

                let mut v = kmh_to_mps(prev.speed);
                let mut remaining = elapsed;
                while remaining > 0.0 && (v - steady).abs() > f64::EPSILON {
                    let dt = remaining.min(MAX_STEP);
                    remaining -= dt;

                    let required = calculate_power(mass, v, Some(slope), &options)?;
                    let e_kin = 0.5 * mass * v * v - (required - power) * dt;
                    let next = if e_kin > 0.0 && mass > 0.0 {
                        (2.0 * e_kin / mass).sqrt()
                    } else {
                        0.0
                    };
                    // never step across the steady state
                    v = if required < power {
                        next.min(steady)
                    } else {
                        next.max(steady)
                    };
                }
                mps_to_kmh(v)
            }
        };

        debug!(device = self.state.device(), power, speed, elapsed, "power meter update");
        Ok(self.state.commit(raw, power, speed, elapsed))
    }

    fn absorb(&mut self, request: &UpdateRequest) -> Result<UpdateRequest> {
        request.validate()?;
        if request.reset {
            self.state.reset();
            return Ok(UpdateRequest::default());
        }
        if let Some(slope) = request.slope {
            self.state.set_slope(slope);
        }
        self.state.set_prev_request(request.clone());
        Ok(UpdateRequest::default())
    }
}

impl CyclingMode for PowerMeterMode {
    fn kind(&self) -> ModeKind {
        ModeKind::PowerMeter
    }

    fn name(&self) -> &'static str {
        "PowerMeter"
    }

    fn description(&self) -> &'static str {
        "Power and cadence are taken from the device. Speed is calculated from power and current slope"
    }

    fn state(&self) -> &ModeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModeState {
        &mut self.state
    }

    fn bike_init_request(&self) -> UpdateRequest {
        UpdateRequest::default()
    }

    fn send_bike_update(&mut self, request: &UpdateRequest) -> UpdateRequest {
        let result = self.absorb(request);
        empty_on_error(&self.state, result)
    }

    fn update_data(&mut self, raw: &BikeData) -> BikeData {
        let result = self.integrate(raw);
        freeze_on_error(&self.state, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapter::{TrainerClass, TrainerProfile},
        clock::ManualClock,
        physics::PhysicsOptions,
    };

    fn mode() -> (PowerMeterMode, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let adapter = Arc::new(TrainerProfile::new("Power Meter", TrainerClass::PowerMeter));
        (PowerMeterMode::new(adapter, clock.clone()), clock)
    }

    #[test]
    fn test_first_update_seeds_snapshot() {
        let (mut mode, _clock) = mode();
        let data = mode.update_data(&BikeData::sample(200.0, 90.0, 130.0));
        assert!(data.speed.abs() < f64::EPSILON);
        assert!((data.power - 200.0).abs() < f64::EPSILON);
        assert!((data.heartrate - 130.0).abs() < f64::EPSILON);
        assert!(data.distance_internal.abs() < f64::EPSILON);
        assert!(mode.data().is_some());
    }

    #[test]
    fn test_speed_converges_to_steady_state() {
        let (mut mode, clock) = mode();
        let sample = BikeData::sample(200.0, 90.0, 0.0);
        let mut speed = 0.0;
        mode.update_data(&sample);
        for _ in 0..600 {
            clock.advance_secs(1);
            let data = mode.update_data(&sample);
            assert!(data.speed >= speed - 1e-9, "speed dropped while accelerating");
            speed = data.speed;
        }

        let steady = calculate_speed(85.0, 200.0, None, &PhysicsOptions::default()).unwrap();
        assert!((speed - steady).abs() < 1.0, "speed {speed}, steady {steady}");
    }

    #[test]
    fn test_sparse_samples_converge() {
        let (mut mode, clock) = mode();
        let sample = BikeData::sample(200.0, 90.0, 0.0);
        mode.update_data(&sample);

        let steady = calculate_speed(85.0, 200.0, None, &PhysicsOptions::default()).unwrap();
        let mut previous = 0.0;
        for _ in 0..12 {
            clock.advance_secs(30);
            let speed = mode.update_data(&sample).speed;
            assert!(speed >= previous - 1e-9, "speed dropped from {previous} to {speed}");
            assert!(speed <= steady + 1e-9, "speed {speed} overshot {steady}");
            previous = speed;
        }
        assert!((previous - steady).abs() < 0.5, "speed {previous}, steady {steady}");
    }

    #[test]
    fn test_not_pedalling_forces_power_and_speed_down() {
        let (mut mode, clock) = mode();
        let riding = BikeData::sample(250.0, 90.0, 0.0);
        mode.update_data(&riding);
        for _ in 0..60 {
            clock.advance_secs(1);
            mode.update_data(&riding);
        }
        let cruising = mode.data().unwrap().speed;

        let stopped = BikeData {
            is_pedalling: false,
            ..BikeData::sample(250.0, 0.0, 0.0)
        };
        clock.advance_secs(1);
        let data = mode.update_data(&stopped);
        assert!(data.power.abs() < f64::EPSILON);
        assert!(data.speed < cruising);
        assert!(data.speed > 0.0, "speed should decay, not snap to zero");

        for _ in 0..600 {
            clock.advance_secs(1);
            mode.update_data(&stopped);
        }
        assert!(mode.data().unwrap().speed < 1.0);
    }

    #[test]
    fn test_slope_is_absorbed() {
        let (mut mode, _clock) = mode();
        let request = mode.send_bike_update(&UpdateRequest::slope(5.0));
        assert!(request.is_empty());
        let data = mode.update_data(&BikeData::sample(200.0, 90.0, 0.0));
        assert_eq!(data.slope, Some(5.0));
    }

    #[test]
    fn test_reset_restarts_distance() {
        let (mut mode, clock) = mode();
        let sample = BikeData::sample(200.0, 90.0, 0.0);
        mode.update_data(&sample);
        for _ in 0..10 {
            clock.advance_secs(1);
            mode.update_data(&sample);
        }
        assert!(mode.data().unwrap().distance_internal > 0.0);

        assert!(mode.send_bike_update(&UpdateRequest::reset()).is_empty());
        assert!(mode.data().is_none());
        let data = mode.update_data(&sample);
        assert!(data.distance_internal.abs() < f64::EPSILON);
    }

    #[test]
    fn test_malformed_sample_keeps_snapshot() {
        let (mut mode, clock) = mode();
        mode.update_data(&BikeData::sample(200.0, 90.0, 0.0));
        clock.advance_secs(1);
        let good = mode.update_data(&BikeData::sample(200.0, 90.0, 0.0));

        clock.advance_secs(1);
        let frozen = mode.update_data(&BikeData::sample(f64::NAN, 90.0, 0.0));
        assert_eq!(frozen, good);
    }

    #[test]
    fn test_identity() {
        let (mode, _clock) = mode();
        assert_eq!(mode.kind(), ModeKind::PowerMeter);
        assert!(!mode.is_erg());
        assert!(!mode.is_sim());
        assert!(mode.bike_init_request().is_empty());
        assert!(mode.property("bikeType").is_some());
    }
}
