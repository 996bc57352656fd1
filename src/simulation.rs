use std::sync::Arc;

use crate::{
    adapter::DeviceAdapter,
    clock::Clock,
    mode::{bike_type_property, start_power_property, CyclingMode, ModeState},
    physics::DEFAULT_CRR,
    settings::{CyclingModeProperty, PropertyType},
    smart_trainer::SmartTrainerMode,
    types::{BikeData, ModeKind, SimulationParameters, UpdateRequest},
};

/// Mode for trainers that accept weight, rolling resistance and wind
///
/// Request handling and speed bookkeeping are those of the slope-following
/// mode. The difference is on the device side: slope travels together with
/// the full [`SimulationParameters`] instead of on its own.
pub struct SimulationMode {
    inner: SmartTrainerMode,
}

impl SimulationMode {
    /// Mode for the given adapter
    #[must_use]
    pub fn new(adapter: Arc<dyn DeviceAdapter>, clock: Arc<dyn Clock>) -> Self {
        let properties = vec![
            bike_type_property(),
            start_power_property(),
            CyclingModeProperty::number(
                "crr",
                "Rolling Resistance",
                "Coefficient of rolling resistance",
                PropertyType::Float,
                (0.001, 0.02),
                DEFAULT_CRR,
            ),
            CyclingModeProperty::number(
                "windSpeed",
                "Wind Speed",
                "Head wind in m/s, negative for tail wind",
                PropertyType::Float,
                (-20.0, 20.0),
                0.0,
            ),
        ];
        Self {
            inner: SmartTrainerMode::with_properties(adapter, clock, properties),
        }
    }
}

impl CyclingMode for SimulationMode {
    fn kind(&self) -> ModeKind {
        ModeKind::AdvancedSimulation
    }

    fn name(&self) -> &'static str {
        "Advanced Simulation"
    }

    fn description(&self) -> &'static str {
        "Calculates speed based on power and slope. Slope, weight, rolling resistance and wind are sent to the device"
    }

    fn state(&self) -> &ModeState {
        self.inner.state()
    }

    fn state_mut(&mut self) -> &mut ModeState {
        self.inner.state_mut()
    }

    fn bike_init_request(&self) -> UpdateRequest {
        self.inner.bike_init_request()
    }

    fn send_bike_update(&mut self, request: &UpdateRequest) -> UpdateRequest {
        self.inner.send_bike_update(request)
    }

    fn update_data(&mut self, raw: &BikeData) -> BikeData {
        self.inner.update_data(raw)
    }

    fn simulation_parameters(&self) -> Option<SimulationParameters> {
        Some(self.state().simulation_parameters())
    }
}
