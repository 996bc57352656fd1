use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::CyclingError;

/// Convert km/h to m/s
#[must_use]
pub fn kmh_to_mps(speed: f64) -> f64 {
    speed / 3.6
}

/// Convert m/s to km/h
#[must_use]
pub fn mps_to_kmh(speed: f64) -> f64 {
    speed * 3.6
}

/// Per-update snapshot of the simulated or real ride state
///
/// Adapters map raw telemetry into this shape before handing it to the active
/// cycling mode. The mode returns a reconciled copy with speed, distance and
/// slope filled in from its physics model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BikeData {
    /// Rider is currently pedalling
    pub is_pedalling: bool,
    /// Power in watts
    pub power: f64,
    /// Cadence in rpm
    pub pedal_rpm: f64,
    /// Speed in km/h
    pub speed: f64,
    /// Heart rate in bpm
    pub heartrate: f64,
    /// Distance in meters, non-decreasing within a session
    pub distance_internal: f64,
    /// Seconds spent moving
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    /// Gear reported by the device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gear: Option<u32>,
    /// Slope in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
}

impl BikeData {
    /// Create a telemetry sample from the values most devices report
    #[must_use]
    pub fn sample(power: f64, pedal_rpm: f64, heartrate: f64) -> Self {
        Self {
            is_pedalling: pedal_rpm > 0.0,
            power,
            pedal_rpm,
            speed: 0.0,
            heartrate,
            distance_internal: 0.0,
            time: None,
            gear: None,
            slope: None,
        }
    }

    /// Check that the numeric fields are finite and non-negative
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::IllegalArgument`] naming the first offending field.
    pub fn validate(&self) -> crate::Result<()> {
        let fields = [
            ("power", self.power),
            ("pedalRpm", self.pedal_rpm),
            ("speed", self.speed),
            ("heartrate", self.heartrate),
            ("distanceInternal", self.distance_internal),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(CyclingError::illegal(format!("{name} = {value}")));
            }
        }
        if let Some(slope) = self.slope {
            if !slope.is_finite() {
                return Err(CyclingError::illegal(format!("slope = {slope}")));
            }
        }
        Ok(())
    }

    /// The rider is not producing any drive
    #[must_use]
    pub fn is_idle(&self) -> bool {
        !self.is_pedalling || self.pedal_rpm == 0.0
    }
}

/// The application's desired device behavior for the next control cycle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    /// Slope in percent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slope: Option<f64>,
    /// Lower power bound in watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_power: Option<f64>,
    /// Upper power bound in watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_power: Option<f64>,
    /// Absolute power target in watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_power: Option<f64>,
    /// Relative power nudge in watts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_power_delta: Option<f64>,
    /// Clear all mode state
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub reset: bool,
    /// Re-emit the last effective command
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub refresh: bool,
}

impl UpdateRequest {
    /// Request a slope change
    #[must_use]
    pub const fn slope(slope: f64) -> Self {
        Self {
            slope: Some(slope),
            min_power: None,
            max_power: None,
            target_power: None,
            target_power_delta: None,
            reset: false,
            refresh: false,
        }
    }

    /// Request an absolute power target
    #[must_use]
    pub const fn target_power(power: f64) -> Self {
        Self {
            slope: None,
            min_power: None,
            max_power: None,
            target_power: Some(power),
            target_power_delta: None,
            reset: false,
            refresh: false,
        }
    }

    /// Request a reset of the mode state
    #[must_use]
    pub fn reset() -> Self {
        Self {
            reset: true,
            ..Self::default()
        }
    }

    /// Request re-emission of the last effective command
    #[must_use]
    pub fn refresh() -> Self {
        Self {
            refresh: true,
            ..Self::default()
        }
    }

    /// No field is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Check the numeric fields of the request
    ///
    /// # Errors
    ///
    /// Returns [`CyclingError::IllegalArgument`] for non-finite values or
    /// negative power bounds.
    pub fn validate(&self) -> crate::Result<()> {
        if let Some(slope) = self.slope {
            if !slope.is_finite() {
                return Err(CyclingError::illegal(format!("slope = {slope}")));
            }
        }
        let powers = [
            ("minPower", self.min_power),
            ("maxPower", self.max_power),
            ("targetPower", self.target_power),
        ];
        for (name, value) in powers {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(CyclingError::illegal(format!("{name} = {value}")));
                }
            }
        }
        if let Some(delta) = self.target_power_delta {
            if !delta.is_finite() {
                return Err(CyclingError::illegal(format!("targetPowerDelta = {delta}")));
            }
        }
        Ok(())
    }
}

/// Bike geometry used to pick the drag area
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BikeType {
    /// Road bike
    #[default]
    Race,
    /// Time trial / triathlon bike
    Triathlon,
    /// Mountain bike
    Mountain,
}

impl BikeType {
    /// Drag coefficient times frontal area in m²
    #[must_use]
    pub const fn cw_a(self) -> f64 {
        match self {
            Self::Race => 0.35,
            Self::Triathlon => 0.29,
            Self::Mountain => 0.57,
        }
    }

    /// Setting value as used in the settings store
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Race => "race",
            Self::Triathlon => "triathlon",
            Self::Mountain => "mountain",
        }
    }
}

impl FromStr for BikeType {
    type Err = CyclingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "race" => Ok(Self::Race),
            "triathlon" | "tt" => Ok(Self::Triathlon),
            "mountain" | "mtb" => Ok(Self::Mountain),
            other => Err(CyclingError::illegal(format!("unknown bike type '{other}'"))),
        }
    }
}

impl fmt::Display for BikeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The closed set of cycling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModeKind {
    /// Read-only power meter, speed from kinetic energy
    PowerMeter,
    /// Slope-following smart trainer
    SmartTrainer,
    /// Trainer holding a commanded power
    Erg,
    /// Trainer accepting full simulation parameters
    AdvancedSimulation,
}

impl fmt::Display for ModeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PowerMeter => write!(f, "PowerMeter"),
            Self::SmartTrainer => write!(f, "Smart Trainer"),
            Self::Erg => write!(f, "ERG"),
            Self::AdvancedSimulation => write!(f, "Advanced Simulation"),
        }
    }
}

/// Physical parameters for trainers that simulate the full ride
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    /// Rider plus bike mass in kg
    pub weight: f64,
    /// Rolling resistance coefficient
    pub crr: f64,
    /// Wind resistance coefficient in kg/m
    pub cw: f64,
    /// Head wind in m/s, negative for tail wind
    pub wind_speed: f64,
    /// Slope in percent
    pub slope: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_conversion() {
        assert!((kmh_to_mps(36.0) - 10.0).abs() < 1e-9);
        assert!((mps_to_kmh(10.0) - 36.0).abs() < 1e-9);
    }

    #[test]
    fn test_bike_type_parsing() {
        assert_eq!("race".parse::<BikeType>().unwrap(), BikeType::Race);
        assert_eq!("Triathlon".parse::<BikeType>().unwrap(), BikeType::Triathlon);
        assert_eq!("mtb".parse::<BikeType>().unwrap(), BikeType::Mountain);
        assert!("unicycle".parse::<BikeType>().is_err());
        assert!((BikeType::Mountain.cw_a() - 0.57).abs() < f64::EPSILON);
    }

    #[test]
    fn test_update_request_helpers() {
        assert!(UpdateRequest::default().is_empty());
        assert!(!UpdateRequest::refresh().is_empty());
        assert_eq!(UpdateRequest::target_power(150.0).target_power, Some(150.0));
        assert!(UpdateRequest::reset().reset);
    }

    #[test]
    fn test_update_request_validation() {
        assert!(UpdateRequest::target_power(-5.0).validate().is_err());
        assert!(UpdateRequest::slope(f64::NAN).validate().is_err());
        let request = UpdateRequest {
            target_power_delta: Some(-20.0),
            ..UpdateRequest::default()
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn test_bike_data_validation() {
        let sample = BikeData::sample(200.0, 90.0, 130.0);
        assert!(sample.is_pedalling);
        assert!(sample.validate().is_ok());

        let broken = BikeData {
            power: -1.0,
            ..sample
        };
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_bike_data_idle() {
        assert!(BikeData::sample(0.0, 0.0, 0.0).is_idle());
        let coasting = BikeData {
            is_pedalling: false,
            ..BikeData::sample(100.0, 80.0, 0.0)
        };
        assert!(coasting.is_idle());
    }
}
