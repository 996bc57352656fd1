use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::{
    clock::Clock,
    error::{CyclingError, Result},
    erg::ErgMode,
    mode::CyclingMode,
    power_meter::PowerMeterMode,
    simulation::SimulationMode,
    smart_trainer::SmartTrainerMode,
    types::ModeKind,
};

/// Default rider weight in kg
pub const DEFAULT_USER_WEIGHT: f64 = 75.0;

/// Default bike weight in kg
pub const DEFAULT_BIKE_WEIGHT: f64 = 10.0;

/// What the surrounding device layer must provide to a cycling mode
///
/// Transport-specific adapters (ANT+, BLE, serial) implement this; the mode
/// only needs the system mass and a name to tag its log output with.
pub trait DeviceAdapter: Send + Sync {
    /// Device name, used as the `device` field in log events
    fn name(&self) -> &str;

    /// Combined rider and bike mass in kg
    fn weight(&self) -> f64;

    /// Cycling modes this device can run, preferred mode first
    fn supported_modes(&self) -> Vec<ModeKind>;

    /// Mode to use when the application did not choose one
    fn default_mode(&self) -> ModeKind {
        self.supported_modes()
            .first()
            .copied()
            .unwrap_or(ModeKind::PowerMeter)
    }
}

/// Control capabilities of a trainer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrainerClass {
    /// Reports power only, cannot be controlled
    PowerMeter,
    /// Accepts power targets
    ErgTrainer,
    /// Accepts power targets and slope
    SmartTrainer,
    /// Accepts power targets and full simulation parameters
    SimulationTrainer,
}

impl TrainerClass {
    /// Modes a trainer of this class supports, preferred first
    #[must_use]
    pub fn supported_modes(self) -> Vec<ModeKind> {
        match self {
            Self::PowerMeter => vec![ModeKind::PowerMeter],
            Self::ErgTrainer => vec![ModeKind::Erg, ModeKind::PowerMeter],
            Self::SmartTrainer => vec![ModeKind::SmartTrainer, ModeKind::Erg, ModeKind::PowerMeter],
            Self::SimulationTrainer => vec![
                ModeKind::AdvancedSimulation,
                ModeKind::SmartTrainer,
                ModeKind::Erg,
                ModeKind::PowerMeter,
            ],
        }
    }
}

/// Rider and trainer description usable as a [`DeviceAdapter`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainerProfile {
    /// Device name
    pub name: String,
    /// Rider weight in kg
    pub user_weight: f64,
    /// Bike weight in kg
    pub bike_weight: f64,
    /// Trainer capabilities
    pub class: TrainerClass,
}

impl TrainerProfile {
    /// Profile with default weights
    #[must_use]
    pub fn new(name: impl Into<String>, class: TrainerClass) -> Self {
        Self {
            name: name.into(),
            user_weight: DEFAULT_USER_WEIGHT,
            bike_weight: DEFAULT_BIKE_WEIGHT,
            class,
        }
    }

    /// Same profile with different weights
    #[must_use]
    pub const fn with_weights(mut self, user_weight: f64, bike_weight: f64) -> Self {
        self.user_weight = user_weight;
        self.bike_weight = bike_weight;
        self
    }
}

impl Default for TrainerProfile {
    fn default() -> Self {
        Self::new("Smart Trainer", TrainerClass::SmartTrainer)
    }
}

impl DeviceAdapter for TrainerProfile {
    fn name(&self) -> &str {
        &self.name
    }

    fn weight(&self) -> f64 {
        self.user_weight + self.bike_weight
    }

    fn supported_modes(&self) -> Vec<ModeKind> {
        self.class.supported_modes()
    }
}

/// Build a cycling mode for the adapter
///
/// # Errors
///
/// Returns [`CyclingError::UnsupportedMode`] if the adapter does not list `kind`.
pub fn create_mode(
    kind: ModeKind,
    adapter: Arc<dyn DeviceAdapter>,
    clock: Arc<dyn Clock>,
) -> Result<Box<dyn CyclingMode>> {
    if !adapter.supported_modes().contains(&kind) {
        return Err(CyclingError::UnsupportedMode(format!(
            "{kind} is not supported by {}",
            adapter.name()
        )));
    }

    info!(device = adapter.name(), mode = %kind, "creating cycling mode");

    let mode: Box<dyn CyclingMode> = match kind {
        ModeKind::PowerMeter => Box::new(PowerMeterMode::new(adapter, clock)),
        ModeKind::SmartTrainer => Box::new(SmartTrainerMode::new(adapter, clock)),
        ModeKind::Erg => Box::new(ErgMode::new(adapter, clock)),
        ModeKind::AdvancedSimulation => Box::new(SimulationMode::new(adapter, clock)),
    };
    Ok(mode)
}

/// Build the adapter's default cycling mode
///
/// # Errors
///
/// Returns [`CyclingError::UnsupportedMode`] if the adapter lists no modes.
pub fn create_default_mode(
    adapter: Arc<dyn DeviceAdapter>,
    clock: Arc<dyn Clock>,
) -> Result<Box<dyn CyclingMode>> {
    let kind = adapter.default_mode();
    create_mode(kind, adapter, clock)
}
