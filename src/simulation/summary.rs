use crate::patient::PatientStatus;
use crate::ventilator::{Phase, VentilatorStatus};
use serde::{Deserialize, Serialize};

/// Extremes of a patient trajectory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectorySummary {
    pub samples: usize,
    pub duration_ms: f64,
    pub peak_pressure: f64,   // Highest mouth pressure (cmH2O)
    pub trough_pressure: f64, // Lowest mouth pressure (cmH2O)
    pub max_flow: f64,        // ml/ms, positive into the lung
    pub min_flow: f64,
    pub tidal_volume: f64,    // Max minus min lung volume (ml)
}

impl TrajectorySummary {
    pub fn from_patient_log(log: &[PatientStatus]) -> Option<Self> {
        let first = log.first()?;
        let last = log.last()?;

        let mut summary = TrajectorySummary {
            samples: log.len(),
            duration_ms: last.time - first.time,
            peak_pressure: first.pressure_mouth,
            trough_pressure: first.pressure_mouth,
            max_flow: first.flow,
            min_flow: first.flow,
            tidal_volume: 0.0,
        };
        let mut min_volume = first.lung_volume;
        let mut max_volume = first.lung_volume;

        for status in &log[1..] {
            summary.peak_pressure = summary.peak_pressure.max(status.pressure_mouth);
            summary.trough_pressure = summary.trough_pressure.min(status.pressure_mouth);
            summary.max_flow = summary.max_flow.max(status.flow);
            summary.min_flow = summary.min_flow.min(status.flow);
            min_volume = min_volume.min(status.lung_volume);
            max_volume = max_volume.max(status.lung_volume);
        }
        summary.tidal_volume = max_volume - min_volume;

        Some(summary)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TransitionCounts {
    pub to_inspiration: usize,
    pub to_expiration: usize,
}

impl TransitionCounts {
    pub fn total(&self) -> usize {
        self.to_inspiration + self.to_expiration
    }
}

/// Counts phase edges in a ventilator log, given the phase it was in
/// before the first entry.
pub fn count_transitions(log: &[VentilatorStatus], initial: Phase) -> TransitionCounts {
    let mut counts = TransitionCounts::default();
    let mut previous = initial;
    for status in log {
        if status.phase != previous {
            match status.phase {
                Phase::Inspiration => counts.to_inspiration += 1,
                Phase::Expiration => counts.to_expiration += 1,
            }
            previous = status.phase;
        }
    }
    counts
}
