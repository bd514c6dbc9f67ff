//! Declarative runs
//!
//! A scenario fixes the patient's resistance and the ventilator settings,
//! starts the patient at PEEP and runs from zero to `end_time_s`.

use super::summary::{count_transitions, TrajectorySummary, TransitionCounts};
use super::{RunSpan, ScheduledChange, Simulation};
use crate::config::ConfigError;
use crate::error::SimError;
use crate::patient::{PatientParams, PatientStatus};
use crate::telegram::{Telegram, TelegramEncoder};
use crate::ventilator::{Phase, VentilatorSettings, VentilatorStatus};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub resistance: f64,
    pub peep: f64,
    pub pi: f64,
    pub rate: f64,
    pub ie: f64,
    pub end_time_s: f64,
    pub time_resolution_ms: f64,
    pub events: Vec<ScheduledChange>,
}

impl Default for Scenario {
    fn default() -> Self {
        Scenario {
            resistance: 10.0,
            peep: 5.0,
            pi: 15.0,
            rate: 10.0,
            ie: 0.5,
            end_time_s: 20.0,
            time_resolution_ms: 50.0,
            events: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioOutcome {
    pub patient: Vec<PatientStatus>,
    pub ventilator: Vec<VentilatorStatus>,
    pub summary: Option<TrajectorySummary>,
    pub transitions: TransitionCounts,
    pub unprocessed_changes: usize,
}

impl ScenarioOutcome {
    pub fn telegrams(&self) -> Result<Vec<Telegram>, SimError> {
        Ok(TelegramEncoder::new().encode(&self.patient)?)
    }
}

impl Scenario {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    pub fn span(&self) -> Result<RunSpan, SimError> {
        RunSpan::new(0.0, self.end_time_s * 1000.0, self.time_resolution_ms)
    }

    pub fn build(&self) -> Result<Simulation, SimError> {
        let patient = PatientParams {
            resistance: self.resistance,
            pressure_mouth: self.peep,
            ..Default::default()
        };
        let ventilator = VentilatorSettings {
            pi: self.pi,
            peep: self.peep,
            rate: self.rate,
            ie: self.ie,
            ..Default::default()
        };
        Simulation::from_params(patient, ventilator)
    }

    pub fn execute(&self, max_iterations: u64) -> Result<ScenarioOutcome, SimError> {
        let span = self.span()?;
        let mut simulation = self.build()?.with_iteration_limit(max_iterations);
        let report = simulation.run(&span, &self.events)?;

        let patient = report.trajectory(simulation.patient()).to_vec();
        let ventilator = simulation.ventilator().log().as_slice().to_vec();
        Ok(ScenarioOutcome {
            summary: TrajectorySummary::from_patient_log(&patient),
            transitions: count_transitions(&ventilator, Phase::Expiration),
            patient,
            ventilator,
            unprocessed_changes: report.unprocessed_changes,
        })
    }
}
