#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(rust_2018_idioms)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

//! # Velomodes 🚴
//!
//! Cycling modes for indoor trainers: the layer between an application and
//! a bike that turns raw telemetry into a physically consistent ride and
//! application requests into commands a given class of trainer understands.
//!
//! A trainer is described by a [`DeviceAdapter`] (name, rider plus bike
//! weight and the modes it supports). Each [`CyclingMode`] owns the ride
//! state for that adapter and implements two operations:
//!
//! - [`CyclingMode::update_data`] folds a raw [`BikeData`] sample into the
//!   ride, deriving speed, distance and moving time from power and slope.
//! - [`CyclingMode::send_bike_update`] normalizes an [`UpdateRequest`]
//!   (slope, target power, power bounds) into what the device should receive.
//!
//! ## Modes
//!
//! - **Power Meter**: nothing is sent; speed follows a kinetic energy balance.
//! - **Smart Trainer**: slope is sent; speed follows the steady-state model.
//! - **ERG**: only power targets are sent; slope is kept for the speed model.
//! - **Advanced Simulation**: slope plus rolling resistance and wind.
//!
//! ## Physics
//!
//! Speed for a given power solves the cubic
//! `(½·ρ·cwA + 2K)·v³ + m·g·(crr + grade)·v − P = 0`, see [`physics`].
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use velomodes::{
//!     create_mode, BikeData, CyclingMode, ManualClock, ModeKind, TrainerClass, TrainerProfile,
//!     UpdateRequest,
//! };
//!
//! fn main() -> velomodes::Result<()> {
//!     let clock = Arc::new(ManualClock::new());
//!     let adapter = Arc::new(TrainerProfile::new("Kickr", TrainerClass::SmartTrainer));
//!     let mut mode = create_mode(ModeKind::SmartTrainer, adapter, clock.clone())?;
//!
//!     // Climb a 4% grade
//!     let request = mode.send_bike_update(&UpdateRequest::slope(4.0));
//!     assert_eq!(request.slope, Some(4.0));
//!
//!     clock.advance_secs(1);
//!     let data = mode.update_data(&BikeData::sample(220.0, 85.0, 140.0));
//!     println!("{:.1} km/h", data.speed);
//!     Ok(())
//! }
//! ```

/// Trainer description and mode factory
pub mod adapter;
/// Time source for elapsed time between samples
pub mod clock;
/// Async trainer driver
pub mod device;
/// ERG mode
pub mod erg;
/// Error types and handling
pub mod error;
/// Cycling mode contract and shared ride state
pub mod mode;
/// Speed and power calculations
pub mod physics;
/// Power meter mode
pub mod power_meter;
/// FTMS control point encoding
pub mod protocol;
/// Mode settings and their declarations
pub mod settings;
/// Advanced simulation mode
pub mod simulation;
/// Slope-following smart trainer mode
pub mod smart_trainer;
/// Type definitions and data structures
pub mod types;

// Re-export the main types for convenient usage
pub use adapter::{create_default_mode, create_mode, DeviceAdapter, TrainerClass, TrainerProfile};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use device::{CommandSink, CyclingDevice, DeviceConfig};
pub use erg::ErgMode;
pub use error::{CyclingError, Result};
pub use mode::{CyclingMode, ModeEvents};
pub use physics::{calculate_power, calculate_speed, solve_cubic, PhysicsOptions};
pub use power_meter::PowerMeterMode;
pub use settings::{CyclingModeProperty, PropertyType, SettingValue, Settings};
pub use simulation::SimulationMode;
pub use smart_trainer::SmartTrainerMode;
pub use types::{BikeData, BikeType, ModeKind, SimulationParameters, UpdateRequest};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
