//! Pressure/volume transfer curves
//!
//! Three monotone curves relate a distending pressure (cmH2O) to a lung
//! volume expressed as a percentage of total lung capacity:
//! - Lung: logarithmic recoil of the lung tissue
//! - ChestWall: exponential recoil of the chest wall
//! - Total: the combined respiratory system
//!
//! The forward direction is a closed formula. The reverse direction goes
//! through a [`CurveSet`], which builds one [`Inverse`] per curve at startup
//! and is shared for the life of the process.

pub mod inversion;

pub use inversion::{ClosedForm, Inverse, TabulatedInverse};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Smallest pressure fed into the logarithmic lung curve.
pub const LOG_EPSILON: f64 = 0.000000001;

/// Pressure range (cmH2O) the inverses are defined on.
pub const PRESSURE_DOMAIN: (f64, f64) = (-50.0, 100.0);

/// Grid spacing used when tabulating a curve for numeric inversion.
pub const GRID_STEP: f64 = 1.0;

// Total respiratory system curve constants
const TOTAL_B: f64 = 46.2134;
const TOTAL_A: f64 = -261.437;
const TOTAL_C: f64 = -9.68139;
const TOTAL_D: f64 = 11.6401;
const TOTAL_F: f64 = 1.2952;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Curve {
    Lung,
    ChestWall,
    Total,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CurveError {
    UnknownCurve(String),
    OutOfDomain { curve: Curve, volume_percent: f64 },
    NotMonotone { curve: Curve, pressure: f64 },
}

impl fmt::Display for CurveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CurveError::UnknownCurve(name) => write!(f, "Unknown curve: {}", name),
            CurveError::OutOfDomain { curve, volume_percent } => write!(
                f,
                "Volume {:.4}% is outside the invertible range of the {} curve",
                volume_percent, curve
            ),
            CurveError::NotMonotone { curve, pressure } => write!(
                f,
                "{} curve is not strictly increasing at {} cmH2O",
                curve, pressure
            ),
        }
    }
}

impl std::error::Error for CurveError {}

impl Curve {
    pub const ALL: [Curve; 3] = [Curve::Lung, Curve::ChestWall, Curve::Total];

    pub fn name(&self) -> &'static str {
        match self {
            Curve::Lung => "Lung",
            Curve::ChestWall => "Chest",
            Curve::Total => "Total",
        }
    }

    /// Volume (% of TLC) at the given pressure (cmH2O).
    pub fn volume_percent(&self, pressure: f64) -> f64 {
        match self {
            Curve::Lung => 6.66 + 27.9 * pressure.max(LOG_EPSILON).ln(),
            Curve::ChestWall => 51.3 * (0.0635 * pressure).exp(),
            Curve::Total => {
                TOTAL_B + TOTAL_C * ((pressure + TOTAL_A) / TOTAL_D).sin() + TOTAL_F * pressure
            }
        }
    }

    /// Pressure bracket this curve is inverted over. The lung curve is
    /// flat below its clamp, so its bracket starts there.
    pub fn domain(&self) -> (f64, f64) {
        match self {
            Curve::Lung => (LOG_EPSILON, PRESSURE_DOMAIN.1),
            Curve::ChestWall | Curve::Total => PRESSURE_DOMAIN,
        }
    }
}

impl fmt::Display for Curve {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Curve {
    type Err = CurveError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Lung" => Ok(Curve::Lung),
            "Chest" | "ChestWall" => Ok(Curve::ChestWall),
            "Total" => Ok(Curve::Total),
            other => Err(CurveError::UnknownCurve(other.to_string())),
        }
    }
}

fn lung_pressure(volume_percent: f64) -> f64 {
    ((volume_percent - 6.66) / 27.9).exp()
}

fn chest_wall_pressure(volume_percent: f64) -> f64 {
    (volume_percent / 51.3).ln() / 0.0635
}

/// One inverse per curve, built once.
#[derive(Debug)]
pub struct CurveSet {
    lung: Box<dyn Inverse>,
    chest_wall: Box<dyn Inverse>,
    total: Box<dyn Inverse>,
}

static SHARED: OnceLock<Arc<CurveSet>> = OnceLock::new();

impl CurveSet {
    /// Closed-form inverses where they exist, a tabulated root-finder for
    /// the total curve.
    pub fn new() -> Result<Self, CurveError> {
        Ok(CurveSet {
            lung: Box::new(ClosedForm::new(Curve::Lung, lung_pressure)),
            chest_wall: Box::new(ClosedForm::new(Curve::ChestWall, chest_wall_pressure)),
            total: Box::new(TabulatedInverse::build(Curve::Total, GRID_STEP)?),
        })
    }

    /// Every curve inverted numerically.
    pub fn tabulated() -> Result<Self, CurveError> {
        Ok(CurveSet {
            lung: Box::new(TabulatedInverse::build(Curve::Lung, GRID_STEP)?),
            chest_wall: Box::new(TabulatedInverse::build(Curve::ChestWall, GRID_STEP)?),
            total: Box::new(TabulatedInverse::build(Curve::Total, GRID_STEP)?),
        })
    }

    /// Process-wide set. The built-in curves are constants, so a failure
    /// here is a defect in this module rather than a runtime condition.
    pub fn shared() -> Arc<CurveSet> {
        SHARED
            .get_or_init(|| {
                Arc::new(CurveSet::new().expect("built-in curves must be monotone on their domain"))
            })
            .clone()
    }

    pub fn volume_percent(&self, curve: Curve, pressure: f64) -> f64 {
        curve.volume_percent(pressure)
    }

    pub fn pressure(&self, curve: Curve, volume_percent: f64) -> Result<f64, CurveError> {
        self.inverse(curve).pressure_at(volume_percent)
    }

    fn inverse(&self, curve: Curve) -> &dyn Inverse {
        match curve {
            Curve::Lung => self.lung.as_ref(),
            Curve::ChestWall => self.chest_wall.as_ref(),
            Curve::Total => self.total.as_ref(),
        }
    }
}
