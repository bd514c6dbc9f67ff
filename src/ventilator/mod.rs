//! Pressure-controlled ventilator
//!
//! The ventilator alternates between inspiration and expiration. Which phase
//! it is in is a pure function of elapsed time and the current settings, so
//! skipped or uneven steps cannot desynchronise the breath cycle.

pub mod pircs;

use crate::curves::PRESSURE_DOMAIN;
use crate::error::{check_positive, check_time_step, SimError};
use crate::trajectory::{Timestamped, Trajectory};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    #[serde(rename = "I")]
    Inspiration,
    #[serde(rename = "E")]
    Expiration,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Inspiration => f.write_str("I"),
            Phase::Expiration => f.write_str("E"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VentilatorSettings {
    pub mode: String,
    /// Target inspiratory pressure (cmH2O)
    pub pi: f64,
    /// Positive end-expiratory pressure (cmH2O)
    pub peep: f64,
    /// Breaths per minute
    pub rate: f64,
    /// Inspiratory:expiratory time ratio
    pub ie: f64,
    /// Only reported under pressure control
    pub target_flow_ml_per_s: f64,
}

impl Default for VentilatorSettings {
    fn default() -> Self {
        VentilatorSettings {
            mode: "PCV".to_string(),
            pi: 15.0,
            peep: 5.0,
            rate: 10.0,
            ie: 0.5,
            target_flow_ml_per_s: 6000.0,
        }
    }
}

impl VentilatorSettings {
    pub fn validate(&self) -> Result<(), SimError> {
        check_positive("rate", self.rate)?;
        check_positive("IE ratio", self.ie)?;
        // targets must stay where the patient's pressures can be recovered
        let (low, high) = PRESSURE_DOMAIN;
        for (name, value) in [("Pi", self.pi), ("PEEP", self.peep)] {
            if !(low..=high).contains(&value) {
                return Err(SimError::InvalidParameter(format!(
                    "{} must be within {}..{} cmH2O, got {}",
                    name, low, high, value
                )));
            }
        }
        Ok(())
    }

    /// Length of one breath in ms.
    pub fn breath_period_ms(&self) -> f64 {
        60000.0 / self.rate
    }

    /// Inspiratory part of a breath in ms.
    pub fn inspiratory_ms(&self) -> f64 {
        self.breath_period_ms() * self.ie / (self.ie + 1.0)
    }

    pub fn target_pressure(&self, phase: Phase) -> f64 {
        match phase {
            Phase::Inspiration => self.pi,
            Phase::Expiration => self.peep,
        }
    }
}

/// Phase at absolute elapsed time; every breath starts with inspiration.
pub fn phase_at(settings: &VentilatorSettings, time_ms: f64) -> Phase {
    let since_breath_start = time_ms % settings.breath_period_ms();
    if since_breath_start < settings.inspiratory_ms() {
        Phase::Inspiration
    } else {
        Phase::Expiration
    }
}

/// Live reconfiguration; unset fields keep their value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettingsUpdate {
    pub pi: Option<f64>,
    pub peep: Option<f64>,
    pub rate: Option<f64>,
    pub ie: Option<f64>,
    /// Applies to the patient, not the ventilator
    pub resistance: Option<f64>,
}

impl SettingsUpdate {
    pub fn applied_to(&self, settings: &VentilatorSettings) -> VentilatorSettings {
        VentilatorSettings {
            pi: self.pi.unwrap_or(settings.pi),
            peep: self.peep.unwrap_or(settings.peep),
            rate: self.rate.unwrap_or(settings.rate),
            ie: self.ie.unwrap_or(settings.ie),
            ..settings.clone()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VentilatorStatus {
    pub time: f64,
    pub phase: Phase,
    pub pressure: f64,
    pub pressure_mouth: f64,
}

impl Timestamped for VentilatorStatus {
    fn time_ms(&self) -> f64 {
        self.time
    }
}

#[derive(Debug)]
pub struct Ventilator {
    time: f64,
    settings: VentilatorSettings,
    phase: Phase,
    pressure: f64,
    pressure_mouth: f64,
    log: Trajectory<VentilatorStatus>,
}

impl Ventilator {
    pub fn new(settings: VentilatorSettings) -> Result<Self, SimError> {
        settings.validate()?;
        Ok(Ventilator {
            time: 0.0,
            settings,
            phase: Phase::Expiration,
            pressure: 0.0,
            pressure_mouth: 0.0,
            log: Trajectory::new(),
        })
    }

    pub fn status(&self) -> VentilatorStatus {
        VentilatorStatus {
            time: self.time,
            phase: self.phase,
            pressure: self.pressure,
            pressure_mouth: self.pressure_mouth,
        }
    }

    /// Advances by `dt` ms given the mouth pressure measured on the patient
    /// side, and logs the result.
    ///
    /// On the step where the phase changes, the regulated pressure jumps to
    /// the new phase's target and overrides the measured mouth pressure.
    /// Between edges the measured pressure passes through unchanged.
    pub fn advance(&mut self, dt: f64, pressure_mouth: f64) -> Result<VentilatorStatus, SimError> {
        let status = self.next_status(dt, pressure_mouth)?;
        self.commit(status)?;
        Ok(status)
    }

    /// The status `advance` would produce, without touching any state.
    pub fn next_status(&self, dt: f64, pressure_mouth: f64) -> Result<VentilatorStatus, SimError> {
        check_time_step(dt)?;

        let time = self.time + dt;
        let mut status = VentilatorStatus {
            time,
            phase: self.phase,
            pressure: self.pressure,
            pressure_mouth,
        };

        let new_phase = phase_at(&self.settings, time);
        if new_phase != self.phase {
            status.phase = new_phase;
            status.pressure = self.settings.target_pressure(new_phase);
            status.pressure_mouth = status.pressure;
        }
        Ok(status)
    }

    /// Logs `status` and makes it current. Fails without changes if it is
    /// older than the latest logged status.
    pub fn commit(&mut self, status: VentilatorStatus) -> Result<(), SimError> {
        self.log.push(status)?;

        self.time = status.time;
        self.phase = status.phase;
        self.pressure = status.pressure;
        self.pressure_mouth = status.pressure_mouth;
        Ok(())
    }

    /// Validates the merged settings before replacing the current ones.
    pub fn reconfigure(&mut self, update: &SettingsUpdate) -> Result<(), SimError> {
        let settings = update.applied_to(&self.settings);
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn replace_settings(&mut self, settings: VentilatorSettings) -> Result<(), SimError> {
        settings.validate()?;
        self.settings = settings;
        Ok(())
    }

    pub fn settings(&self) -> &VentilatorSettings {
        &self.settings
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn log(&self) -> &Trajectory<VentilatorStatus> {
        &self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ventilator() -> Ventilator {
        Ventilator::new(VentilatorSettings::default()).unwrap()
    }

    #[test]
    fn test_breath_timing() {
        let settings = VentilatorSettings::default();
        assert_eq!(settings.breath_period_ms(), 6000.0);
        assert_eq!(settings.inspiratory_ms(), 2000.0);
    }

    #[test]
    fn test_phase_is_periodic() {
        let settings = VentilatorSettings::default();
        let period = settings.breath_period_ms();
        assert_eq!(phase_at(&settings, 0.0), phase_at(&settings, period));
        assert_eq!(phase_at(&settings, 1999.0), Phase::Inspiration);
        assert_eq!(phase_at(&settings, 2000.0), Phase::Expiration);
        assert_eq!(phase_at(&settings, 5999.0), Phase::Expiration);
        assert_eq!(phase_at(&settings, 3.0 * period + 10.0), Phase::Inspiration);
    }

    #[test]
    fn test_starts_in_expiration() {
        let v = ventilator();
        assert_eq!(v.phase(), Phase::Expiration);
        assert_eq!(v.status().pressure, 0.0);
        assert!(v.log().is_empty());
    }

    #[test]
    fn test_edge_overrides_mouth_pressure() {
        let mut v = ventilator();
        let first = v.advance(50.0, 3.0).unwrap();
        assert_eq!(first.phase, Phase::Inspiration);
        assert_eq!(first.pressure, 15.0);
        assert_eq!(first.pressure_mouth, 15.0);

        // no edge: measured pressure passes through
        let second = v.advance(50.0, 12.5).unwrap();
        assert_eq!(second.phase, Phase::Inspiration);
        assert_eq!(second.pressure, 15.0);
        assert_eq!(second.pressure_mouth, 12.5);
    }

    #[test]
    fn test_phase_recovers_after_time_jump() {
        let mut v = ventilator();
        v.advance(50.0, 0.0).unwrap();
        let status = v.advance(2950.0, 15.0).unwrap();
        assert_eq!(status.time, 3000.0);
        assert_eq!(status.phase, Phase::Expiration);
        assert_eq!(status.pressure_mouth, 5.0);
    }

    #[test]
    fn test_reconfigure_validates_before_applying() {
        let mut v = ventilator();
        let bad = SettingsUpdate { rate: Some(0.0), pi: Some(30.0), ..Default::default() };
        assert!(v.reconfigure(&bad).is_err());
        assert_eq!(v.settings(), &VentilatorSettings::default());

        let good = SettingsUpdate { rate: Some(20.0), pi: Some(25.0), ..Default::default() };
        v.reconfigure(&good).unwrap();
        assert_eq!(v.settings().rate, 20.0);
        assert_eq!(v.settings().pi, 25.0);
        assert_eq!(v.settings().peep, 5.0);
    }

    #[test]
    fn test_rejects_invalid_settings() {
        let settings = VentilatorSettings { ie: -1.0, ..Default::default() };
        assert!(Ventilator::new(settings).is_err());
    }

    #[test]
    fn test_rejects_targets_outside_pressure_domain() {
        let too_high = VentilatorSettings { pi: 150.0, ..Default::default() };
        assert!(matches!(too_high.validate(), Err(SimError::InvalidParameter(_))));
        let too_low = VentilatorSettings { peep: -60.0, ..Default::default() };
        assert!(too_low.validate().is_err());
        let nan = VentilatorSettings { pi: f64::NAN, ..Default::default() };
        assert!(nan.validate().is_err());
        let edge = VentilatorSettings { pi: 100.0, peep: -50.0, ..Default::default() };
        assert!(edge.validate().is_ok());
    }

    #[test]
    fn test_next_status_does_not_commit() {
        let mut v = ventilator();
        let preview = v.next_status(50.0, 3.0).unwrap();
        assert_eq!(v.time(), 0.0);
        assert_eq!(v.phase(), Phase::Expiration);
        assert!(v.log().is_empty());

        v.commit(preview).unwrap();
        assert_eq!(v.status(), preview);
        assert_eq!(v.log().len(), 1);
        assert!(v.commit(VentilatorStatus { time: 10.0, ..preview }).is_err());
        assert_eq!(v.time(), 50.0);
    }
}
