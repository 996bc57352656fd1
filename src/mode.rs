//! The contract every cycling mode implements, and the state they share.
//!
//! A mode sits between the device adapter and the application. Telemetry goes
//! through [`CyclingMode::update_data`], which folds one sample into the
//! physics model and returns the reconciled snapshot. Control requests go
//! through [`CyclingMode::send_bike_update`], which returns the minimal request
//! the device should actually receive.
//!
//! Neither call blocks and neither is thread-safe; the owner serializes them
//! (see [`crate::device::CyclingDevice`]).

use serde::{Deserialize, Serialize};
use std::{sync::Arc, time::Duration};
use tracing::{debug, warn};

use crate::{
    adapter::DeviceAdapter,
    clock::Clock,
    error::{CyclingError, Result},
    physics::{calculate_speed, PhysicsOptions},
    settings::{CyclingModeProperty, PropertyType, SettingValue, Settings, SettingsStore},
    types::{kmh_to_mps, BikeData, BikeType, ModeKind, SimulationParameters, UpdateRequest},
};

/// Moving time after which the startup power floor is released
pub const STARTUP_WINDOW: Duration = Duration::from_secs(5);

/// Observability flags other layers may poll after an update
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeEvents {
    /// Cadence changed in the last update
    pub rpm_updated: bool,
    /// Gear changed in the last update
    pub gear_updated: bool,
    /// Startup window is still open
    pub starting: bool,
}

/// Grace period at ride start during which power targets have a floor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartupWindow {
    moving: Duration,
}

impl StartupWindow {
    /// Freshly opened window
    #[must_use]
    pub const fn new() -> Self {
        Self {
            moving: Duration::ZERO,
        }
    }

    /// Account for `elapsed` seconds ridden at `speed` km/h
    pub fn record(&mut self, elapsed: f64, speed: f64) {
        if speed > 0.0 && elapsed > 0.0 {
            self.moving += Duration::from_secs_f64(elapsed);
        }
    }

    /// Less than [`STARTUP_WINDOW`] of moving time so far
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.moving < STARTUP_WINDOW
    }

    /// Raise `target` to `floor` while the window is open
    #[must_use]
    pub fn apply_floor(&self, target: f64, floor: f64) -> f64 {
        if self.is_open() && target < floor {
            floor
        } else {
            target
        }
    }
}

impl Default for StartupWindow {
    fn default() -> Self {
        Self::new()
    }
}

/// Property declaring the bike type
pub(crate) fn bike_type_property() -> CyclingModeProperty {
    CyclingModeProperty::select(
        "bikeType",
        "Bike Type",
        "Drag profile used to calculate speed",
        &["race", "triathlon", "mountain"],
        BikeType::Race.as_str(),
    )
}

/// Property declaring the starting power
pub(crate) fn start_power_property() -> CyclingModeProperty {
    CyclingModeProperty::number(
        "startPower",
        "Starting Power",
        "Power target at ride start in watts",
        PropertyType::Integer,
        (25.0, 800.0),
        50.0,
    )
}

/// State carried by every mode instance
///
/// `data` is `None` until the first telemetry sample after construction or
/// reset arrives.
pub struct ModeState {
    adapter: Arc<dyn DeviceAdapter>,
    clock: Arc<dyn Clock>,
    settings: SettingsStore,
    data: Option<BikeData>,
    prev_request: Option<UpdateRequest>,
    last_update: Option<Duration>,
    pending_update: Option<Duration>,
    slope: f64,
    events: ModeEvents,
    startup: StartupWindow,
}

impl ModeState {
    /// State for a mode declaring `properties`
    #[must_use]
    pub fn new(
        adapter: Arc<dyn DeviceAdapter>,
        clock: Arc<dyn Clock>,
        properties: Vec<CyclingModeProperty>,
    ) -> Self {
        Self {
            adapter,
            clock,
            settings: SettingsStore::new(properties),
            data: None,
            prev_request: None,
            last_update: None,
            pending_update: None,
            slope: 0.0,
            events: ModeEvents {
                starting: true,
                ..ModeEvents::default()
            },
            startup: StartupWindow::new(),
        }
    }

    /// Device name for log fields
    #[must_use]
    pub fn device(&self) -> &str {
        self.adapter.name()
    }

    /// Combined rider and bike mass in kg
    #[must_use]
    pub fn weight(&self) -> f64 {
        self.adapter.weight()
    }

    /// Settings store
    #[must_use]
    pub const fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Mutable settings store
    pub fn settings_mut(&mut self) -> &mut SettingsStore {
        &mut self.settings
    }

    /// Last reconciled snapshot
    #[must_use]
    pub const fn data(&self) -> Option<&BikeData> {
        self.data.as_ref()
    }

    /// Last normalized request
    #[must_use]
    pub const fn prev_request(&self) -> Option<&UpdateRequest> {
        self.prev_request.as_ref()
    }

    pub(crate) fn set_prev_request(&mut self, request: UpdateRequest) {
        self.prev_request = Some(request);
    }

    /// Current simulated slope in percent
    #[must_use]
    pub const fn slope(&self) -> f64 {
        self.slope
    }

    /// Change the simulated slope; the snapshot follows immediately
    pub fn set_slope(&mut self, slope: f64) {
        self.slope = slope;
        if let Some(data) = self.data.as_mut() {
            data.slope = Some(slope);
        }
    }

    /// Event flags from the last update
    #[must_use]
    pub const fn events(&self) -> ModeEvents {
        self.events
    }

    /// Power last reported by the device, 0 before the first sample
    #[must_use]
    pub fn device_power(&self) -> f64 {
        self.data.as_ref().map_or(0.0, |data| data.power)
    }

    /// Speed of the last snapshot, 0 before the first sample
    #[must_use]
    pub fn speed(&self) -> f64 {
        self.data.as_ref().map_or(0.0, |data| data.speed)
    }

    /// Raise a power target to `floor` during the startup window
    #[must_use]
    pub fn startup_floor(&self, target: f64, floor: f64) -> f64 {
        let floored = self.startup.apply_floor(target, floor);
        if floored > target {
            debug!(device = self.device(), target, floor, "holding startup power floor");
        }
        floored
    }

    /// Physics parameters derived from the settings
    #[must_use]
    pub fn physics_options(&self) -> PhysicsOptions {
        let bike_type: BikeType = self
            .settings
            .text("bikeType")
            .and_then(|text| text.parse().ok())
            .unwrap_or_default();
        let mut options = PhysicsOptions::for_bike(bike_type);
        if self.settings.property("crr").is_some() {
            options.crr = self.settings.number("crr");
        }
        options
    }

    /// Seconds since the last committed update, 0 for the first one
    ///
    /// The interval is only consumed by [`ModeState::commit`]; a sample that
    /// is rejected in between leaves it to the next one.
    pub fn elapsed(&mut self) -> f64 {
        let now = self.clock.now();
        self.pending_update = Some(now);
        self.last_update
            .map_or(Duration::ZERO, |last| now.saturating_sub(last))
            .as_secs_f64()
    }

    /// Clear the snapshot, the previous request and all transient flags
    pub fn reset(&mut self) {
        debug!(device = self.device(), "resetting mode state");
        self.data = None;
        self.prev_request = None;
        self.last_update = None;
        self.pending_update = None;
        self.slope = 0.0;
        self.startup = StartupWindow::new();
        self.events = ModeEvents {
            starting: true,
            ..ModeEvents::default()
        };
    }

    /// Steady-state speed for `power` on the current slope
    ///
    /// Fails closed: a numeric domain error keeps the previous speed.
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::IllegalArgument`] for a negative mass or power.
    pub fn steady_speed(&self, power: f64) -> Result<f64> {
        let previous = self.speed();
        let options = self.physics_options().with_previous(previous);
        match calculate_speed(self.weight(), power, Some(self.slope), &options) {
            Err(CyclingError::NumericDomain { operation, detail }) => {
                warn!(device = self.device(), operation, %detail, "keeping previous speed");
                Ok(previous)
            }
            other => other,
        }
    }

    /// Store a new snapshot built from `raw` with the computed power and speed
    pub fn commit(&mut self, raw: &BikeData, power: f64, speed: f64, elapsed: f64) -> BikeData {
        let speed = speed.max(0.0);
        if let Some(now) = self.pending_update.take() {
            self.last_update = Some(now);
        }
        let (distance, time) = self.data.as_ref().map_or((0.0, 0.0), |prev| {
            (prev.distance_internal, prev.time.unwrap_or(0.0))
        });

        self.events.rpm_updated = self
            .data
            .as_ref()
            .is_some_and(|prev| prev.pedal_rpm != raw.pedal_rpm);
        self.events.gear_updated = self.data.as_ref().is_some_and(|prev| prev.gear != raw.gear);

        self.startup.record(elapsed, speed);
        self.events.starting = self.startup.is_open();

        let snapshot = BikeData {
            is_pedalling: raw.is_pedalling,
            power,
            pedal_rpm: raw.pedal_rpm,
            speed,
            heartrate: raw.heartrate,
            distance_internal: distance + kmh_to_mps(speed) * elapsed,
            time: Some(if speed > 0.0 { time + elapsed } else { time }),
            gear: raw.gear,
            slope: Some(self.slope),
        };
        self.data = Some(snapshot.clone());
        snapshot
    }

    /// Fold one sample using the steady-state model
    ///
    /// With `low_speed_decay`, zero power below [`MIN_SPEED`] lowers the speed
    /// by [`SPEED_DECAY`] per update instead of solving the model.
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::IllegalArgument`] for malformed telemetry.
    pub fn reconcile_steady(&mut self, raw: &BikeData, low_speed_decay: bool) -> Result<BikeData> {
        raw.validate()?;
        let elapsed = self.elapsed();
        let power = if raw.is_idle() { 0.0 } else { raw.power };
        let previous = self.speed();

        let speed = if low_speed_decay && power == 0.0 && previous < MIN_SPEED {
            (previous - SPEED_DECAY).max(0.0)
        } else {
            self.steady_speed(power)?
        };

        Ok(self.commit(raw, power, speed, elapsed))
    }

    /// Simulation parameters matching the current settings
    #[must_use]
    pub fn simulation_parameters(&self) -> SimulationParameters {
        let options = self.physics_options();
        SimulationParameters {
            weight: self.weight(),
            crr: options.crr(),
            cw: 0.5 * crate::physics::RHO * options.cw_a(),
            wind_speed: self.settings.number("windSpeed").unwrap_or(0.0),
            slope: self.slope,
        }
    }
}

/// Speed in km/h below which an idle trainer coasts down linearly
pub const MIN_SPEED: f64 = 10.0;

/// Linear coast-down per update in km/h
pub const SPEED_DECAY: f64 = 1.0;

/// Degrade a failed update to the last good snapshot
pub(crate) fn freeze_on_error(state: &ModeState, result: Result<BikeData>) -> BikeData {
    result.unwrap_or_else(|error| {
        warn!(device = state.device(), %error, "rejecting bike data update");
        state.data().cloned().unwrap_or_default()
    })
}

/// Degrade a failed request normalization to an empty request
pub(crate) fn empty_on_error(state: &ModeState, result: Result<UpdateRequest>) -> UpdateRequest {
    result.unwrap_or_else(|error| {
        warn!(device = state.device(), %error, "rejecting bike update request");
        UpdateRequest::default()
    })
}

/// A cycling mode: converts telemetry into simulated ride data and
/// application requests into device commands
pub trait CyclingMode: Send {
    /// Which variant this is
    fn kind(&self) -> ModeKind;

    /// Display name
    fn name(&self) -> &'static str;

    /// One-line description for mode pickers
    fn description(&self) -> &'static str;

    /// Shared state
    fn state(&self) -> &ModeState;

    /// Shared state, mutable
    fn state_mut(&mut self) -> &mut ModeState;

    /// Request to issue once at ride start
    fn bike_init_request(&self) -> UpdateRequest;

    /// Normalize an application request into what the device should receive
    ///
    /// Never fails: a malformed request yields an empty request.
    fn send_bike_update(&mut self, request: &UpdateRequest) -> UpdateRequest;

    /// Fold one telemetry sample into the model and return the reconciled data
    ///
    /// Never fails: malformed telemetry leaves the last snapshot in place.
    fn update_data(&mut self, raw: &BikeData) -> BikeData;

    /// Declared configurable properties
    fn properties(&self) -> &[CyclingModeProperty] {
        self.state().settings().properties()
    }

    /// Declared property for `key`
    fn property(&self, key: &str) -> Option<&CyclingModeProperty> {
        self.state().settings().property(key)
    }

    /// Setting value, falling back to the declared default
    fn setting(&self, key: &str) -> Option<SettingValue> {
        self.state().settings().get(key)
    }

    /// Validate and store one setting
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::UnknownSetting`] or [`CyclingError::InvalidSetting`].
    fn set_setting(&mut self, key: &str, value: SettingValue) -> Result<()> {
        self.state_mut().settings_mut().set(key, value)
    }

    /// Effective settings: stored values with declared defaults filled in
    fn settings(&self) -> Settings {
        let store = self.state().settings();
        store
            .properties()
            .iter()
            .filter_map(|property| store.get(&property.key).map(|value| (property.key.clone(), value)))
            .collect()
    }

    /// Validate and store several settings at once
    ///
    /// # Errors
    ///
    /// Returns the first validation error; nothing is stored in that case.
    fn set_settings(&mut self, settings: Settings) -> Result<()> {
        self.state_mut().settings_mut().set_all(settings)
    }

    /// Last reconciled snapshot
    fn data(&self) -> Option<&BikeData> {
        self.state().data()
    }

    /// Last normalized request
    fn prev_request(&self) -> Option<&UpdateRequest> {
        self.state().prev_request()
    }

    /// Event flags from the last update
    fn events(&self) -> ModeEvents {
        self.state().events()
    }

    /// Clear all mode state
    fn reset(&mut self) {
        self.state_mut().reset();
    }

    /// The device is driven by power targets
    fn is_erg(&self) -> bool {
        self.kind() == ModeKind::Erg
    }

    /// The device is driven by slope
    fn is_sim(&self) -> bool {
        matches!(self.kind(), ModeKind::SmartTrainer | ModeKind::AdvancedSimulation)
    }

    /// Full simulation parameters, for trainers that accept them
    fn simulation_parameters(&self) -> Option<SimulationParameters> {
        None
    }
}
