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
    types::{BikeData, ModeKind, UpdateRequest},
};

/// Lowest power target a relative nudge can produce
pub const MIN_TARGET_POWER: f64 = 10.0;

/// Mode for trainers holding a commanded power
///
/// Slope is tracked for the speed calculation but never sent to the device.
/// Every request the device receives carries at most a `targetPower`.
pub struct ErgMode {
    state: ModeState,
}

impl ErgMode {
    /// Mode for the given adapter
    #[must_use]
    pub fn new(adapter: Arc<dyn DeviceAdapter>, clock: Arc<dyn Clock>) -> Self {
        Self {
            state: ModeState::new(
                adapter,
                clock,
                vec![bike_type_property(), start_power_property()],
            ),
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
            request.refresh = false;
        }

        let device_power = self.state.device_power();
        let prev_target = self.state.prev_request().and_then(|prev| prev.target_power);
        let actionable = request.target_power.is_some()
            || request.target_power_delta.is_some()
            || request.min_power.is_some()
            || request.max_power.is_some();
        let refresh = request.refresh || !actionable;

        let mut target = request.target_power;

        if let Some(delta) = request.target_power_delta {
            let base = target.or(prev_target).unwrap_or(device_power);
            target = Some((base + delta).max(MIN_TARGET_POWER));
        }
        if target.is_none() && refresh {
            target = Some(prev_target.unwrap_or_else(|| self.start_power()));
        }
        if let Some(value) = target {
            target = Some(self.state.startup_floor(value, self.start_power()));
        }

        if let Some(max) = request.max_power {
            target = target.map(|value| value.min(max));
            if target.is_none() && device_power > max {
                target = Some(max);
            }
        }
        if let Some(min) = request.min_power {
            target = target.map(|value| value.max(min));
            if target.is_none() && device_power < min {
                target = Some(min);
            }
        }

        self.state.set_prev_request(UpdateRequest {
            target_power: target.or(prev_target),
            min_power: request.min_power,
            max_power: request.max_power,
            ..UpdateRequest::default()
        });

        let mut normalized = UpdateRequest::default();
        match target {
            Some(value) if !refresh && prev_target == Some(value) => {
                debug!(device = self.state.device(), target_power = value, "target unchanged");
            }
            other => normalized.target_power = other,
        }
        Ok(normalized)
    }
}

impl CyclingMode for ErgMode {
    fn kind(&self) -> ModeKind {
        ModeKind::Erg
    }

    fn name(&self) -> &'static str {
        "ERG"
    }

    fn description(&self) -> &'static str {
        "Calculates speed based on power and slope. Power targets are set by the workout or remain stable throughout the ride"
    }

    fn state(&self) -> &ModeState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut ModeState {
        &mut self.state
    }

    fn bike_init_request(&self) -> UpdateRequest {
        UpdateRequest::target_power(self.start_power())
    }

    fn send_bike_update(&mut self, request: &UpdateRequest) -> UpdateRequest {
        let result = self.normalize(request);
        empty_on_error(&self.state, result)
    }

    fn update_data(&mut self, raw: &BikeData) -> BikeData {
        let result = self.state.reconcile_steady(raw, true);
        freeze_on_error(&self.state, result)
    }
}
