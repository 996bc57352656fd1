use std::sync::Arc;
use tracing::debug;

use crate::{
    adapter::DeviceAdapter,
    clock::Clock,
    error::Result,
    mode::{
        bike_type_property, empty_on_error, freeze_on_error, start_power_property, CyclingMode,
        ModeState,
    },
    settings::CyclingModeProperty,
    types::{BikeData, ModeKind, UpdateRequest},
};

/// Slope-following mode for smart trainers
///
/// The device receives the slope and adjusts its resistance; the reported
/// power is turned back into speed with the steady-state model. Power targets
/// are still accepted and take precedence over slope.
pub struct SmartTrainerMode {
    state: ModeState,
}

impl SmartTrainerMode {
    /// Mode for the given adapter
    #[must_use]
    pub fn new(adapter: Arc<dyn DeviceAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self::with_properties(
            adapter,
            clock,
            vec![bike_type_property(), start_power_property()],
        )
    }

    pub(crate) fn with_properties(
        adapter: Arc<dyn DeviceAdapter>,
        clock: Arc<dyn Clock>,
        properties: Vec<CyclingModeProperty>,
    ) -> Self {
        Self {
            state: ModeState::new(adapter, clock, properties),
        }
    }

    fn start_power(&self) -> f64 {
        self.state.settings().number("startPower").unwrap_or(50.0)
    }

    fn normalize(&mut self, request: &UpdateRequest) -> Result<UpdateRequest> {
        request.validate()?;
        if request.reset {
            self.state.reset();
            return Ok(UpdateRequest::reset());
        }

        if let Some(slope) = request.slope {
            self.state.set_slope(slope);
        }

        let mut request = request.clone();
        if let (Some(min), Some(max)) = (request.min_power, request.max_power) {
            if (min - max).abs() < f64::EPSILON {
                request.target_power = Some(max);
            }
        }
        if request.target_power.is_some() {
            request.slope = None;
            request.refresh = false;
        }

        if request.refresh {
            let mut repeated = UpdateRequest::default();
            match self.state.prev_request() {
                Some(prev) => {
                    repeated.slope = prev.slope;
                    repeated.target_power = prev.target_power;
                }
                None => repeated.slope = Some(self.state.slope()),
            }
            debug!(device = self.state.device(), ?repeated, "refreshing last command");
            return Ok(repeated);
        }

        let mut normalized = UpdateRequest::default();
        let mut effective = UpdateRequest::default();

        if let Some(slope) = request.slope {
            normalized.slope = Some(slope);
            effective.slope = Some(slope);
        }

        if let Some(target) = request.target_power {
            let mut target = self.state.startup_floor(target, self.start_power());
            if let Some(max) = request.max_power {
                target = target.min(max);
            }
            if let Some(min) = request.min_power {
                target = target.max(min);
            }
            effective.target_power = Some(target);

            let reported = self.state.data().map(|data| data.power);
            if reported.is_some_and(|power| (power - target).abs() < f64::EPSILON) {
                debug!(device = self.state.device(), target_power = target, "device already at target");
            } else {
                normalized.target_power = Some(target);
            }
        }

        if effective != UpdateRequest::default() {
            self.state.set_prev_request(effective);
        }
        Ok(normalized)
    }
}

impl CyclingMode for SmartTrainerMode {
    fn kind(&self) -> ModeKind {
        ModeKind::SmartTrainer
    }

    fn name(&self) -> &'static str {
        "SmartTrainer"
    }

    fn description(&self) -> &'static str {
        "Calculates speed based on power and slope. Slope is sent to the device"
    }

    fn state(&self) -> &ModeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModeState {
        &mut self.state
    }

    fn bike_init_request(&self) -> UpdateRequest {
        UpdateRequest::slope(0.0)
    }

    fn send_bike_update(&mut self, request: &UpdateRequest) -> UpdateRequest {
        let result = self.normalize(request);
        empty_on_error(&self.state, result)
    }

    fn update_data(&mut self, raw: &BikeData) -> BikeData {
        let result = self.state.reconcile_steady(raw, false);
        freeze_on_error(&self.state, result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        adapter::{TrainerClass, TrainerProfile},
        clock::ManualClock,
    };

    fn mode() -> (SmartTrainerMode, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let adapter = Arc::new(TrainerProfile::new("Flux", TrainerClass::SmartTrainer));
        (SmartTrainerMode::new(adapter, clock.clone()), clock)
    }

    #[test]
    fn test_init_request_is_flat() {
        let (mode, _clock) = mode();
        assert_eq!(mode.bike_init_request(), UpdateRequest::slope(0.0));
        assert!(mode.is_sim());
        assert!(!mode.is_erg());
    }

    #[test]
    fn test_slope_is_forwarded() {
        let (mut mode, _clock) = mode();
        let normalized = mode.send_bike_update(&UpdateRequest::slope(3.5));
        assert_eq!(normalized.slope, Some(3.5));
        assert!(normalized.target_power.is_none());
        assert!((mode.state().slope() - 3.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_target_power_drops_slope() {
        let (mut mode, _clock) = mode();
        let request = UpdateRequest {
            slope: Some(2.0),
            target_power: Some(180.0),
            refresh: true,
            ..UpdateRequest::default()
        };
        let normalized = mode.send_bike_update(&request);
        assert_eq!(normalized.target_power, Some(180.0));
        assert!(normalized.slope.is_none());
        assert!((mode.state().slope() - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_same_target_suppressed() {
        let (mut mode, _clock) = mode();
        mode.update_data(&BikeData::sample(150.0, 90.0, 0.0));

        let first = mode.send_bike_update(&UpdateRequest::target_power(160.0));
        assert_eq!(first.target_power, Some(160.0));

        mode.update_data(&BikeData::sample(150.0, 90.0, 0.0));
        let repeated = mode.send_bike_update(&UpdateRequest::target_power(150.0));
        assert!(repeated.target_power.is_none());
    }

    #[test]
    fn test_refresh_repeats_previous_command() {
        let (mut mode, _clock) = mode();
        mode.send_bike_update(&UpdateRequest::target_power(210.0));
        let refreshed = mode.send_bike_update(&UpdateRequest::refresh());
        assert_eq!(refreshed.target_power, Some(210.0));

        mode.send_bike_update(&UpdateRequest::slope(-2.0));
        let refreshed = mode.send_bike_update(&UpdateRequest::refresh());
        assert_eq!(refreshed.slope, Some(-2.0));
        assert!(refreshed.target_power.is_none());
    }

    #[test]
    fn test_refresh_without_history_sends_current_slope() {
        let (mut mode, _clock) = mode();
        let refreshed = mode.send_bike_update(&UpdateRequest::refresh());
        assert_eq!(refreshed.slope, Some(0.0));
    }

    #[test]
    fn test_bounds_clamp_target() {
        let (mut mode, _clock) = mode();
        let request = UpdateRequest {
            target_power: Some(500.0),
            max_power: Some(350.0),
            ..UpdateRequest::default()
        };
        assert_eq!(mode.send_bike_update(&request).target_power, Some(350.0));

        let request = UpdateRequest {
            target_power: Some(120.0),
            min_power: Some(140.0),
            ..UpdateRequest::default()
        };
        assert_eq!(mode.send_bike_update(&request).target_power, Some(140.0));

        let request = UpdateRequest {
            min_power: Some(200.0),
            max_power: Some(200.0),
            slope: Some(5.0),
            ..UpdateRequest::default()
        };
        let normalized = mode.send_bike_update(&request);
        assert_eq!(normalized.target_power, Some(200.0));
        assert!(normalized.slope.is_none());
    }

    #[test]
    fn test_startup_floor_holds_then_releases() {
        let (mut mode, clock) = mode();
        assert_eq!(
            mode.send_bike_update(&UpdateRequest::target_power(20.0)).target_power,
            Some(50.0)
        );

        let sample = BikeData::sample(150.0, 90.0, 0.0);
        mode.update_data(&sample);
        for _ in 0..5 {
            clock.advance_secs(1);
            mode.update_data(&sample);
        }
        assert!(!mode.events().starting);
        assert_eq!(
            mode.send_bike_update(&UpdateRequest::target_power(20.0)).target_power,
            Some(20.0)
        );
    }

    #[test]
    fn test_speed_from_steady_state() {
        let (mut mode, clock) = mode();
        let flat = mode.update_data(&BikeData::sample(200.0, 90.0, 0.0));
        assert!((30.0..=34.0).contains(&flat.speed), "speed {}", flat.speed);

        mode.send_bike_update(&UpdateRequest::slope(-4.0));
        clock.advance_secs(1);
        let descending = mode.update_data(&BikeData::sample(0.0, 0.0, 0.0));
        assert!(descending.speed > 0.0);
        assert!(descending.power.abs() < f64::EPSILON);
        assert!(descending.distance_internal > flat.distance_internal);
    }

    #[test]
    fn test_rpm_updated_flag() {
        let (mut mode, clock) = mode();
        mode.update_data(&BikeData::sample(200.0, 90.0, 0.0));
        clock.advance_secs(1);
        mode.update_data(&BikeData::sample(200.0, 90.0, 0.0));
        assert!(!mode.events().rpm_updated);
        clock.advance_secs(1);
        mode.update_data(&BikeData::sample(200.0, 95.0, 0.0));
        assert!(mode.events().rpm_updated);
    }
}
