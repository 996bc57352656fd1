//! Cycling physics kernel
//!
//! Speed and power are linked by the steady-state power balance
//!
//! ```text
//! P = (0.5·ρ·cwA + 2k)·v³ + (grade + cRR)·m·g·v
//! ```
//!
//! Drag is cubic in velocity, so recovering speed from power means solving a
//! depressed cubic. [`solve_cubic`] does that in closed form; the caller picks
//! the physically valid root.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::trace;

use crate::{
    error::{CyclingError, Result},
    types::{kmh_to_mps, mps_to_kmh, BikeType},
};

/// Gravitational acceleration in m/s²
pub const G: f64 = 9.80665;

/// Air density in kg/m³
pub const RHO: f64 = 1.20410;

/// Drivetrain loss constant
pub const K: f64 = 0.01090;

/// Default rolling resistance coefficient
pub const DEFAULT_CRR: f64 = 0.0036;

/// Model parameters for [`calculate_speed`] and [`calculate_power`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicsOptions {
    /// Bike geometry, selects the default drag area
    pub bike_type: BikeType,
    /// Drag area override in m²
    pub cw_a: Option<f64>,
    /// Rolling resistance override
    pub crr: Option<f64>,
    /// Previous speed in km/h, used to choose between multiple valid roots
    pub previous: Option<f64>,
}

impl PhysicsOptions {
    /// Options for the given bike type
    #[must_use]
    pub const fn for_bike(bike_type: BikeType) -> Self {
        Self {
            bike_type,
            cw_a: None,
            crr: None,
            previous: None,
        }
    }

    /// Same options with a previous speed for root hysteresis
    #[must_use]
    pub const fn with_previous(mut self, speed: f64) -> Self {
        self.previous = Some(speed);
        self
    }

    /// Effective drag area in m²
    #[must_use]
    pub fn cw_a(&self) -> f64 {
        self.cw_a.unwrap_or_else(|| self.bike_type.cw_a())
    }

    /// Effective rolling resistance
    #[must_use]
    pub fn crr(&self) -> f64 {
        self.crr.unwrap_or(DEFAULT_CRR)
    }

    fn cubic_coefficient(&self) -> f64 {
        0.5 * RHO * self.cw_a() + 2.0 * K
    }
}

/// Real n-th root that keeps the sign for negative radicands and odd `n`
#[must_use]
pub fn sqrt_n(x: f64, n: i32) -> f64 {
    let exponent = 1.0 / f64::from(n);
    if x < 0.0 && n % 2 == 1 {
        -(-x).powf(exponent)
    } else {
        x.powf(exponent)
    }
}

fn domain_error(operation: &'static str, detail: String) -> CyclingError {
    CyclingError::NumericDomain { operation, detail }
}

/// Solve the depressed cubic `t³ + p·t + q = 0`
///
/// Returns every real root (one to three of them), unfiltered. Arguments to
/// `acos`/`acosh` are clamped to their domain to absorb rounding right at the
/// case boundaries.
///
/// # Errors
///
/// Returns [`CyclingError::NumericDomain`] if `p` or `q` is not finite or a
/// root comes out as NaN/infinity.
pub fn solve_cubic(p: f64, q: f64) -> Result<Vec<f64>> {
    if !p.is_finite() || !q.is_finite() {
        return Err(domain_error("solve_cubic", format!("p={p}, q={q}")));
    }

    let roots = if p == 0.0 {
        vec![-sqrt_n(q, 3)]
    } else {
        let half_q = (q / 2.0).powi(2);
        let third_p = (p / 3.0).powi(3);
        let d = half_q + third_p;
        let sign = if q < 0.0 { -1.0 } else { 1.0 };

        // relative to the terms, so tiny coefficients keep all their roots
        if d.abs() <= f64::EPSILON * half_q.max(third_p.abs()) {
            vec![3.0 * q / p, -3.0 * q / (2.0 * p)]
        } else if d < 0.0 && p < 0.0 {
            let r = sign * (p.abs() / 3.0).sqrt();
            let cos_phi = (q / (2.0 * r.powi(3))).clamp(-1.0, 1.0);
            let phi = cos_phi.acos();
            (0..3)
                .map(|k| -2.0 * r * (phi / 3.0 + f64::from(k) * 2.0 * PI / 3.0).cos())
                .collect()
        } else if p < 0.0 {
            let r = sign * (p.abs() / 3.0).sqrt();
            let cosh_phi = (q / (2.0 * r.powi(3))).max(1.0);
            let phi = cosh_phi.acosh();
            vec![-2.0 * r * (phi / 3.0).cosh()]
        } else {
            let r = sign * (p / 3.0).sqrt();
            let phi = (q / (2.0 * r.powi(3))).asinh();
            vec![-2.0 * r * (phi / 3.0).sinh()]
        }
    };

    if roots.iter().any(|t| !t.is_finite()) {
        return Err(domain_error("solve_cubic", format!("p={p}, q={q}, roots={roots:?}")));
    }
    Ok(roots)
}

fn require_non_negative(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(CyclingError::illegal(format!("{name} must be non-negative, got {value}")))
    }
}

/// Steady-state speed in km/h for the given power
///
/// Negative roots are discarded. With several positive roots the one closest
/// to `options.previous` wins, otherwise the first. Returns 0 when no positive
/// root exists. A missing slope counts as flat.
///
/// # Errors
///
/// Returns [`CyclingError::IllegalArgument`] for a negative `mass` or `power`,
/// and [`CyclingError::NumericDomain`] if the cubic cannot be solved.
pub fn calculate_speed(
    mass: f64,
    power: f64,
    slope: Option<f64>,
    options: &PhysicsOptions,
) -> Result<f64> {
    require_non_negative("mass", mass)?;
    require_non_negative("power", power)?;

    let grade = slope.unwrap_or(0.0) / 100.0;
    let c1 = options.cubic_coefficient();
    let c2 = (grade + options.crr()) * mass * G;

    let roots = solve_cubic(c2 / c1, -power / c1)?;
    let mut positive = roots.into_iter().filter(|v| *v > 0.0);

    let speed = match options.previous {
        Some(previous) => {
            let previous = kmh_to_mps(previous);
            positive.min_by(|a, b| (a - previous).abs().total_cmp(&(b - previous).abs()))
        }
        None => positive.next(),
    };

    let speed = speed.map_or(0.0, mps_to_kmh);
    trace!(mass, power, grade, speed, "calculated speed");
    Ok(speed)
}

/// Power in watts needed to hold `speed` (m/s) on the given slope
///
/// # Errors
///
/// Returns [`CyclingError::IllegalArgument`] for a negative `mass` or `speed`.
pub fn calculate_power(
    mass: f64,
    speed: f64,
    slope: Option<f64>,
    options: &PhysicsOptions,
) -> Result<f64> {
    require_non_negative("mass", mass)?;
    require_non_negative("speed", speed)?;

    let angle = (slope.unwrap_or(0.0) / 100.0).atan();
    let c1 = options.cubic_coefficient();
    let c2 = (angle.sin() + options.crr()) * mass * G;

    Ok(c1 * speed.powi(3) + c2 * speed)
}
