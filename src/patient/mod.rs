//! Single-compartment patient mechanics
//!
//! The patient is a linear airway resistance in series with one elastic
//! compartment whose pressure/volume relationship is given by the curves in
//! [`crate::curves`]. Units throughout: pressures in cmH2O, volumes in ml,
//! time in ms, flow in ml/ms (numerically equal to l/s), resistance in
//! cmH2O per ml/ms.

use crate::curves::{Curve, CurveSet};
use crate::error::{check_positive, check_time_step, SimError};
use crate::trajectory::{Timestamped, Trajectory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Reads any code: only "M" selects the larger lung capacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Sex {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
}

impl Sex {
    /// Anything other than "M" is treated as female.
    pub fn from_code(code: &str) -> Sex {
        if code == "M" {
            Sex::Male
        } else {
            Sex::Female
        }
    }

    /// Total lung capacity in ml.
    pub fn total_lung_capacity(&self) -> f64 {
        match self {
            Sex::Male => 6000.0,
            Sex::Female => 4200.0,
        }
    }
}

impl From<String> for Sex {
    fn from(code: String) -> Self {
        Sex::from_code(&code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatientParams {
    pub height_cm: f64,
    pub weight_kg: f64,
    pub sex: Sex,
    pub pressure_mouth: f64,
    pub resistance: f64,
}

impl Default for PatientParams {
    fn default() -> Self {
        PatientParams {
            height_cm: 175.0,
            weight_kg: 70.0,
            sex: Sex::Male,
            pressure_mouth: 0.0,
            resistance: 10.0,
        }
    }
}

impl PatientParams {
    pub fn validate(&self) -> Result<(), SimError> {
        check_positive("resistance", self.resistance)?;
        if !self.pressure_mouth.is_finite() {
            return Err(SimError::InvalidParameter(format!(
                "mouth pressure must be finite, got {}",
                self.pressure_mouth
            )));
        }
        Ok(())
    }
}

/// One step of patient state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PatientStatus {
    pub time: f64,
    pub pressure_mouth: f64,
    pub pressure_alveolus: f64,
    pub pressure_intrapleural: f64,
    pub lung_volume: f64,
    pub flow: f64,
}

impl Timestamped for PatientStatus {
    fn time_ms(&self) -> f64 {
        self.time
    }
}

#[derive(Debug)]
pub struct Patient {
    time: f64,
    height_cm: f64,
    weight_kg: f64,
    sex: Sex,
    tlc: f64,
    resistance: f64,
    pressure_mouth: f64,
    pressure_alveolus: f64,
    pressure_intrapleural: f64,
    lung_volume: f64,
    flow: f64,
    curves: Arc<CurveSet>,
    log: Trajectory<PatientStatus>,
}

impl Patient {
    pub fn new(params: PatientParams) -> Result<Self, SimError> {
        Self::with_curves(params, CurveSet::shared())
    }

    /// Starts at mechanical equilibrium: no flow, alveolar pressure equal to
    /// mouth pressure and the relaxed volume of the total curve.
    pub fn with_curves(params: PatientParams, curves: Arc<CurveSet>) -> Result<Self, SimError> {
        params.validate()?;

        let tlc = params.sex.total_lung_capacity();
        let v_percent = curves.volume_percent(Curve::Total, params.pressure_mouth);
        let pressure_intrapleural = curves.pressure(Curve::ChestWall, v_percent)?;

        Ok(Patient {
            time: 0.0,
            height_cm: params.height_cm,
            weight_kg: params.weight_kg,
            sex: params.sex,
            tlc,
            resistance: params.resistance,
            pressure_mouth: params.pressure_mouth,
            pressure_alveolus: params.pressure_mouth,
            pressure_intrapleural,
            lung_volume: tlc * v_percent / 100.0,
            flow: 0.0,
            curves,
            log: Trajectory::new(),
        })
    }

    pub fn status(&self) -> PatientStatus {
        PatientStatus {
            time: self.time,
            pressure_mouth: self.pressure_mouth,
            pressure_alveolus: self.pressure_alveolus,
            pressure_intrapleural: self.pressure_intrapleural,
            lung_volume: self.lung_volume,
            flow: self.flow,
        }
    }

    /// Advances by `dt` ms with the given mouth pressure and logs the result.
    ///
    /// Flow is driven by the mouth-to-alveolus gradient across the airway
    /// resistance and integrated with a forward Euler step. A zero `dt`
    /// records a snapshot without changing the lung volume. The state is
    /// left untouched if the new volume cannot be mapped back to pressures.
    pub fn advance(&mut self, dt: f64, pressure_mouth: f64) -> Result<PatientStatus, SimError> {
        check_time_step(dt)?;

        let gradient = pressure_mouth - self.pressure_alveolus;
        let flow = gradient / self.resistance;
        let lung_volume = self.lung_volume + flow * dt;
        let v_percent = lung_volume * 100.0 / self.tlc;
        let pressure_alveolus = self.curves.pressure(Curve::Total, v_percent)?;
        let pressure_intrapleural = self.curves.pressure(Curve::ChestWall, v_percent)?;

        let status = PatientStatus {
            time: self.time + dt,
            pressure_mouth,
            pressure_alveolus,
            pressure_intrapleural,
            lung_volume,
            flow,
        };
        self.log.push(status)?;

        self.time = status.time;
        self.pressure_mouth = pressure_mouth;
        self.flow = flow;
        self.lung_volume = lung_volume;
        self.pressure_alveolus = pressure_alveolus;
        self.pressure_intrapleural = pressure_intrapleural;

        Ok(status)
    }

    pub fn set_resistance(&mut self, resistance: f64) -> Result<(), SimError> {
        check_positive("resistance", resistance)?;
        self.resistance = resistance;
        Ok(())
    }

    pub fn params(&self) -> PatientParams {
        PatientParams {
            height_cm: self.height_cm,
            weight_kg: self.weight_kg,
            sex: self.sex,
            pressure_mouth: self.pressure_mouth,
            resistance: self.resistance,
        }
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn pressure_mouth(&self) -> f64 {
        self.pressure_mouth
    }

    pub fn pressure_alveolus(&self) -> f64 {
        self.pressure_alveolus
    }

    pub fn total_lung_capacity(&self) -> f64 {
        self.tlc
    }

    pub fn resistance(&self) -> f64 {
        self.resistance
    }

    pub fn log(&self) -> &Trajectory<PatientStatus> {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn patient(pressure_mouth: f64) -> Patient {
        Patient::new(PatientParams { pressure_mouth, ..Default::default() }).unwrap()
    }

    #[test]
    fn test_starts_at_equilibrium() {
        let p = patient(5.0);
        let status = p.status();
        assert_eq!(status.flow, 0.0);
        assert_eq!(status.pressure_alveolus, 5.0);
        assert_eq!(status.time, 0.0);
        let expected = 6000.0 * Curve::Total.volume_percent(5.0) / 100.0;
        assert!((status.lung_volume - expected).abs() < 1e-9);
        assert!(p.log().is_empty());
    }

    #[test]
    fn test_tlc_depends_on_sex() {
        let female = Patient::new(PatientParams { sex: Sex::Female, ..Default::default() }).unwrap();
        assert_eq!(female.total_lung_capacity(), 4200.0);
        assert_eq!(patient(0.0).total_lung_capacity(), 6000.0);
        assert_eq!(Sex::from_code("X"), Sex::Female);
    }

    #[test]
    fn test_rejects_non_positive_resistance() {
        for resistance in [0.0, -3.0, f64::NAN] {
            let result = Patient::new(PatientParams { resistance, ..Default::default() });
            assert!(matches!(result, Err(SimError::InvalidParameter(_))));
        }
        let mut p = patient(0.0);
        assert!(p.set_resistance(0.0).is_err());
        assert_eq!(p.resistance(), 10.0);
    }

    #[test]
    fn test_zero_step_seeds_without_moving_volume() {
        let mut p = patient(5.0);
        let before = p.status().lung_volume;
        let status = p.advance(0.0, 5.0).unwrap();
        assert_eq!(status.time, 0.0);
        assert_eq!(status.flow, 0.0);
        assert_eq!(status.lung_volume, before);
        assert!((status.pressure_alveolus - 5.0).abs() < 1e-9);
        assert_eq!(p.log().len(), 1);
    }

    #[test]
    fn test_zero_gradient_conserves_volume() {
        let mut p = patient(8.0);
        let volume = p.status().lung_volume;
        let alveolar = p.pressure_alveolus();
        let status = p.advance(50.0, alveolar).unwrap();
        assert_eq!(status.flow, 0.0);
        assert_eq!(status.lung_volume, volume);
        assert_eq!(status.time, 50.0);
    }

    #[test]
    fn test_positive_gradient_inflates() {
        let mut p = patient(5.0);
        let start = p.status();
        let status = p.advance(50.0, 15.0).unwrap();
        assert!((status.flow - 1.0).abs() < 1e-12);
        assert!((status.lung_volume - (start.lung_volume + 50.0)).abs() < 1e-9);
        assert!(status.pressure_alveolus > start.pressure_alveolus);
        assert!(status.pressure_alveolus < 15.0);
    }

    #[test]
    fn test_invalid_step_leaves_state_untouched() {
        let mut p = patient(5.0);
        let before = p.status();
        assert!(matches!(p.advance(-1.0, 5.0), Err(SimError::InvalidTimeStep(_))));
        assert_eq!(p.status(), before);
        assert!(p.log().is_empty());
    }

    #[test]
    fn test_out_of_domain_volume_fails() {
        let mut p = patient(5.0);
        let result = p.advance(100_000.0, 60.0);
        assert!(matches!(result, Err(SimError::Curve(_))));
        assert_eq!(p.time(), 0.0);
    }
}
