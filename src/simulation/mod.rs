//! Coupled ventilator/patient stepping
//!
//! Each tick advances the ventilator with the mouth pressure the patient
//! recorded on the previous tick, then advances the patient with the mouth
//! pressure the ventilator just produced. The one-tick lag in each direction
//! is part of the model and the order must not be swapped.

pub mod scenario;
pub mod session;
pub mod summary;

use crate::error::{check_positive, SimError};
use crate::patient::{Patient, PatientParams, PatientStatus};
use crate::ventilator::{SettingsUpdate, Ventilator, VentilatorSettings, VentilatorStatus};
use serde::{Deserialize, Serialize};

/// Time horizon of a run: ticks at `start_ms`, `start_ms + step_ms`, ...
/// strictly before `end_ms`.
///
/// The ticks only drive scheduled changes. Patient and ventilator clocks
/// keep counting from their own origin whatever `start_ms` is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RunSpan {
    pub start_ms: f64,
    pub end_ms: f64,
    pub step_ms: f64,
}

impl RunSpan {
    pub fn new(start_ms: f64, end_ms: f64, step_ms: f64) -> Result<Self, SimError> {
        check_positive("step", step_ms)?;
        if !start_ms.is_finite() || !end_ms.is_finite() || end_ms < start_ms {
            return Err(SimError::InvalidParameter(format!(
                "run span {}..{} ms is not a valid range",
                start_ms, end_ms
            )));
        }
        Ok(RunSpan { start_ms, end_ms, step_ms })
    }

    pub fn iterations(&self) -> u64 {
        ((self.end_ms - self.start_ms) / self.step_ms).ceil() as u64
    }

    pub fn check_limit(&self, limit: u64) -> Result<(), SimError> {
        let requested = self.iterations();
        if requested > limit {
            return Err(SimError::TooManySteps { requested, limit });
        }
        Ok(())
    }

    fn ticks(&self) -> impl Iterator<Item = f64> {
        let RunSpan { start_ms, step_ms, .. } = *self;
        (0..self.iterations()).map(move |i| start_ms + i as f64 * step_ms)
    }
}

/// A settings change applied once the loop clock reaches `at_ms`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledChange {
    pub at_ms: f64,
    #[serde(flatten)]
    pub change: SettingsUpdate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    /// Index of this run's seed snapshot in the patient log
    pub first_snapshot: usize,
    pub steps: u64,
    pub unprocessed_changes: usize,
}

impl RunReport {
    /// Patient snapshots produced by this run, seed included.
    pub fn trajectory<'a>(&self, patient: &'a Patient) -> &'a [PatientStatus] {
        &patient.log().as_slice()[self.first_snapshot..]
    }
}

/// One patient/ventilator pair, owned together.
#[derive(Debug)]
pub struct Simulation {
    patient: Patient,
    ventilator: Ventilator,
    max_iterations: u64,
}

impl Simulation {
    pub fn new(patient: Patient, ventilator: Ventilator) -> Self {
        Simulation {
            patient,
            ventilator,
            max_iterations: u64::MAX,
        }
    }

    pub fn from_params(patient: PatientParams, ventilator: VentilatorSettings) -> Result<Self, SimError> {
        Ok(Self::new(Patient::new(patient)?, Ventilator::new(ventilator)?))
    }

    pub fn with_iteration_limit(mut self, limit: u64) -> Self {
        self.max_iterations = limit;
        self
    }

    /// Logs a patient snapshot without advancing time.
    pub fn seed(&mut self) -> Result<PatientStatus, SimError> {
        let pressure_mouth = self.patient.pressure_mouth();
        self.patient.advance(0.0, pressure_mouth)
    }

    /// Advances both sides by `dt` ms. On error neither side changes.
    pub fn step(&mut self, dt: f64) -> Result<(VentilatorStatus, PatientStatus), SimError> {
        let ventilator_status = self.ventilator.next_status(dt, self.patient.pressure_mouth())?;
        let patient_status = self.patient.advance(dt, ventilator_status.pressure_mouth)?;
        // next_status is never older than the ventilator log, so this holds
        self.ventilator.commit(ventilator_status)?;
        Ok((ventilator_status, patient_status))
    }

    pub fn run(&mut self, span: &RunSpan, changes: &[ScheduledChange]) -> Result<RunReport, SimError> {
        span.check_limit(self.max_iterations)?;
        log::debug!(
            "Running {} steps of {} ms from {} ms",
            span.iterations(),
            span.step_ms,
            span.start_ms
        );

        let first_snapshot = self.patient.log().len();
        self.seed()?;

        let mut pending: Vec<&ScheduledChange> = changes.iter().collect();
        pending.sort_by(|a, b| a.at_ms.total_cmp(&b.at_ms));
        let mut pending = pending.into_iter().peekable();

        let mut steps = 0;
        for current_ms in span.ticks() {
            self.step(span.step_ms)?;
            steps += 1;

            while let Some(scheduled) = pending.next_if(|c| c.at_ms <= current_ms) {
                log::info!("Applying scheduled change at {} ms: {:?}", current_ms, scheduled.change);
                self.reconfigure(&scheduled.change)?;
            }
        }

        let unprocessed_changes = pending.count();
        if unprocessed_changes > 0 {
            log::warn!("{} scheduled changes left unprocessed", unprocessed_changes);
        }

        Ok(RunReport { first_snapshot, steps, unprocessed_changes })
    }

    /// Applies a live settings change. Nothing changes if any part is invalid.
    pub fn reconfigure(&mut self, update: &SettingsUpdate) -> Result<(), SimError> {
        if let Some(resistance) = update.resistance {
            check_positive("resistance", resistance)?;
        }
        self.ventilator.reconfigure(update)?;
        if let Some(resistance) = update.resistance {
            self.patient.set_resistance(resistance)?;
        }
        Ok(())
    }

    pub fn patient(&self) -> &Patient {
        &self.patient
    }

    pub fn ventilator(&self) -> &Ventilator {
        &self.ventilator
    }

    pub fn ventilator_mut(&mut self) -> &mut Ventilator {
        &mut self.ventilator
    }
}

/// Pairs a patient with a ventilator, runs them over `span` and hands the
/// pair back with the report.
pub fn run_loop(
    patient: Patient,
    ventilator: Ventilator,
    span: &RunSpan,
    changes: &[ScheduledChange],
) -> Result<(Simulation, RunReport), SimError> {
    let mut simulation = Simulation::new(patient, ventilator);
    let report = simulation.run(span, changes)?;
    Ok((simulation, report))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::summary::{count_transitions, TrajectorySummary};
    use crate::telegram::TelegramEncoder;
    use crate::ventilator::Phase;
    use pretty_assertions::assert_eq;

    fn reference_pair() -> Simulation {
        Simulation::from_params(
            PatientParams { resistance: 10.0, pressure_mouth: 5.0, ..Default::default() },
            VentilatorSettings { pi: 15.0, peep: 5.0, rate: 10.0, ie: 0.5, ..Default::default() },
        )
        .unwrap()
    }

    #[test]
    fn test_span_iterations() {
        assert_eq!(RunSpan::new(0.0, 6000.0, 50.0).unwrap().iterations(), 120);
        assert_eq!(RunSpan::new(0.0, 110.0, 50.0).unwrap().iterations(), 3);
        assert_eq!(RunSpan::new(0.0, 0.0, 50.0).unwrap().iterations(), 0);
        assert!(RunSpan::new(0.0, 100.0, 0.0).is_err());
        assert!(RunSpan::new(100.0, 0.0, 10.0).is_err());
    }

    #[test]
    fn test_one_breath_reference_run() {
        let mut sim = reference_pair();
        let span = RunSpan::new(0.0, 6000.0, 50.0).unwrap();
        let report = sim.run(&span, &[]).unwrap();
        assert_eq!(report.steps, 120);

        let trajectory = report.trajectory(sim.patient());
        assert_eq!(trajectory.len(), 121);
        assert_eq!(trajectory[0].time, 0.0);
        assert_eq!(trajectory[120].time, 6000.0);

        let summary = TrajectorySummary::from_patient_log(trajectory).unwrap();
        assert_eq!(summary.peak_pressure, 15.0);
        assert_eq!(summary.trough_pressure, 5.0);
        assert!(summary.tidal_volume > 0.0);

        // edges at 50 (E->I), 2000 (I->E) and 6000 (start of the next breath)
        let counts = count_transitions(sim.ventilator().log().as_slice(), Phase::Expiration);
        assert_eq!(counts.to_inspiration, 2);
        assert_eq!(counts.to_expiration, 1);
        assert_eq!(counts.total(), 3);

        let telegrams = TelegramEncoder::new().encode(trajectory).unwrap();
        assert_eq!(telegrams.len(), 2 * trajectory.len());
        for (pair, status) in telegrams.chunks(2).zip(trajectory) {
            assert_eq!(pair[0].ms, pair[1].ms);
            assert_eq!(pair[0].ms, status.time as i64);
        }
    }

    #[test]
    fn test_transitions_match_breath_count() {
        let mut sim = reference_pair();
        let breaths = 10;
        let period = sim.ventilator().settings().breath_period_ms();
        let span = RunSpan::new(0.0, breaths as f64 * period, 50.0).unwrap();
        sim.run(&span, &[]).unwrap();

        let log = sim.ventilator().log();
        let window = log.range(0.0, breaths as f64 * period);
        let counts = count_transitions(window, Phase::Expiration);
        assert_eq!(counts.to_inspiration, breaths);
        assert_eq!(counts.to_expiration, breaths);
    }

    #[test]
    fn test_runs_are_deterministic() {
        let span = RunSpan::new(0.0, 12000.0, 25.0).unwrap();
        let mut a = reference_pair();
        let mut b = reference_pair();
        a.run(&span, &[]).unwrap();
        b.run(&span, &[]).unwrap();
        assert_eq!(a.patient().log(), b.patient().log());
        assert_eq!(a.ventilator().log(), b.ventilator().log());
    }

    #[test]
    fn test_ventilator_sees_previous_patient_reading() {
        let mut sim = reference_pair();
        sim.seed().unwrap();
        let (v1, p1) = sim.step(50.0).unwrap();
        assert_eq!(v1.pressure_mouth, 15.0);
        assert_eq!(p1.pressure_mouth, 15.0);

        let (v2, _) = sim.step(50.0).unwrap();
        assert_eq!(v2.pressure_mouth, p1.pressure_mouth);
    }

    #[test]
    fn test_failed_step_leaves_both_sides_in_step() {
        let mut sim = Simulation::from_params(
            PatientParams { resistance: 1.0, pressure_mouth: 5.0, ..Default::default() },
            VentilatorSettings { pi: 60.0, ..Default::default() },
        )
        .unwrap();
        sim.seed().unwrap();

        // one long inspiratory step overfills the lung past the curve range
        assert!(matches!(sim.step(1000.0), Err(SimError::Curve(_))));
        assert_eq!(sim.ventilator().time(), 0.0);
        assert_eq!(sim.ventilator().phase(), Phase::Expiration);
        assert!(sim.ventilator().log().is_empty());
        assert_eq!(sim.patient().log().len(), 1);
        assert_eq!(sim.patient().time(), 0.0);

        let (ventilator, patient) = sim.step(50.0).unwrap();
        assert_eq!(ventilator.time, patient.time);
        assert_eq!(sim.ventilator().log().len(), 1);
        assert_eq!(sim.patient().log().len(), 2);
    }

    #[test]
    fn test_scheduled_change_takes_effect() {
        let mut sim = reference_pair();
        let span = RunSpan::new(0.0, 18000.0, 50.0).unwrap();
        let changes = vec![
            ScheduledChange {
                at_ms: 6000.0,
                change: SettingsUpdate { pi: Some(25.0), ..Default::default() },
            },
            ScheduledChange {
                at_ms: 60000.0,
                change: SettingsUpdate { peep: Some(8.0), ..Default::default() },
            },
        ];
        let report = sim.run(&span, &changes).unwrap();
        assert_eq!(report.unprocessed_changes, 1);
        assert_eq!(sim.ventilator().settings().pi, 25.0);
        assert_eq!(sim.ventilator().settings().peep, 5.0);

        let peak = report
            .trajectory(sim.patient())
            .iter()
            .map(|s| s.pressure_mouth)
            .fold(f64::MIN, f64::max);
        assert_eq!(peak, 25.0);
    }

    #[test]
    fn test_iteration_limit() {
        let mut sim = reference_pair().with_iteration_limit(100);
        let span = RunSpan::new(0.0, 6000.0, 50.0).unwrap();
        assert!(matches!(
            sim.run(&span, &[]),
            Err(SimError::TooManySteps { requested: 120, limit: 100 })
        ));
        assert!(sim.patient().log().is_empty());
    }

    #[test]
    fn test_reconfigure_is_all_or_nothing() {
        let mut sim = reference_pair();
        let update = SettingsUpdate { pi: Some(30.0), resistance: Some(-1.0), ..Default::default() };
        assert!(sim.reconfigure(&update).is_err());
        assert_eq!(sim.ventilator().settings().pi, 15.0);

        let update = SettingsUpdate { pi: Some(30.0), resistance: Some(20.0), ..Default::default() };
        sim.reconfigure(&update).unwrap();
        assert_eq!(sim.ventilator().settings().pi, 30.0);
        assert_eq!(sim.patient().resistance(), 20.0);
    }

    #[test]
    fn test_run_loop_hands_back_the_pair() {
        let patient = Patient::new(PatientParams::default()).unwrap();
        let ventilator = Ventilator::new(VentilatorSettings::default()).unwrap();
        let span = RunSpan::new(0.0, 1000.0, 50.0).unwrap();
        let (sim, report) = run_loop(patient, ventilator, &span, &[]).unwrap();
        assert_eq!(report.steps, 20);
        assert_eq!(sim.patient().log().len(), 21);
        assert_eq!(sim.ventilator().log().len(), 20);
    }
}
