//! Live sessions
//!
//! A session owns one simulation and advances it in step with the wall
//! clock: each data request simulates the time that passed since the
//! previous one, capped, and returns it as telegrams stamped in wall-clock
//! milliseconds. Sessions never share a patient or ventilator.

use super::Simulation;
use crate::config::SimulationConfig;
use crate::error::SimError;
use crate::patient::{PatientParams, PatientStatus};
use crate::telegram::{Telegram, TelegramEncoder};
use crate::ventilator::pircs::{Acknowledgement, PircsCommand};
use crate::ventilator::{VentilatorSettings, VentilatorStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub id: u64,
    pub created_at: DateTime<Utc>,
    pub patient: PatientStatus,
    pub ventilator: VentilatorStatus,
    pub settings: VentilatorSettings,
    pub logged_snapshots: usize,
}

#[derive(Debug)]
pub struct Session {
    id: u64,
    created_at: DateTime<Utc>,
    simulation: Simulation,
    sample_rate_ms: i64,
    max_samples: usize,
    last_sample_ms: i64,
}

impl Session {
    pub fn new(
        id: u64,
        mut simulation: Simulation,
        config: &SimulationConfig,
        now: DateTime<Utc>,
    ) -> Result<Self, SimError> {
        let sample_rate_ms = i64::try_from(config.sample_rate_ms)
            .ok()
            .filter(|rate| *rate > 0)
            .ok_or_else(|| {
                SimError::InvalidParameter(format!("sample rate {} ms", config.sample_rate_ms))
            })?;
        simulation.seed()?;

        Ok(Session {
            id,
            created_at: now,
            simulation,
            sample_rate_ms,
            max_samples: config.max_samples,
            last_sample_ms: now.timestamp_millis(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Simulates the samples that fit between the previous request and
    /// `now_ms`, at most `n` and at most the configured maximum, and returns
    /// their telegrams. The first sample is stamped `count` periods before
    /// `now_ms`. If a step fails part way, the samples already simulated are
    /// still returned.
    pub fn sample(&mut self, n: usize, now_ms: i64) -> Result<Vec<Telegram>, SimError> {
        let elapsed = (now_ms - self.last_sample_ms).max(0);
        self.last_sample_ms = now_ms;

        let count = ((elapsed / self.sample_rate_ms) as usize)
            .min(self.max_samples)
            .min(n);
        if count == 0 {
            return Ok(Vec::new());
        }

        let dt = self.sample_rate_ms as f64;
        let mut taken = 0;
        for _ in 0..count {
            match self.simulation.step(dt) {
                Ok(_) => taken += 1,
                Err(e) if taken > 0 => {
                    log::warn!("Session {} stopped after {} of {} samples: {}", self.id, taken, count, e);
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        let snapshots = self.simulation.patient().log().last_n(taken);
        let first_sample_ms = now_ms - count as i64 * self.sample_rate_ms;
        let offset = first_sample_ms as f64 - snapshots[0].time;
        Ok(TelegramEncoder::new().with_time_offset(offset).encode(snapshots)?)
    }

    pub fn control(&mut self, command: &PircsCommand) -> Acknowledgement {
        let result = command.apply(self.simulation.ventilator_mut());
        if let Err(ref e) = result {
            log::warn!("Session {} rejected control command: {}", self.id, e);
        }
        command.acknowledge(&result)
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id,
            created_at: self.created_at,
            patient: self.simulation.patient().status(),
            ventilator: self.simulation.ventilator().status(),
            settings: self.simulation.ventilator().settings().clone(),
            logged_snapshots: self.simulation.patient().log().len(),
        }
    }

    pub fn simulation(&self) -> &Simulation {
        &self.simulation
    }
}

/// All live sessions, each behind its own lock.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<u64, Arc<Mutex<Session>>>>,
    next_id: AtomicU64,
    config: SimulationConfig,
}

impl SessionRegistry {
    pub fn new(config: SimulationConfig) -> Self {
        SessionRegistry {
            sessions: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            config,
        }
    }

    pub fn create(
        &self,
        patient: PatientParams,
        ventilator: VentilatorSettings,
        now: DateTime<Utc>,
    ) -> Result<u64, SimError> {
        let simulation = Simulation::from_params(patient, ventilator)?
            .with_iteration_limit(self.config.max_iterations);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let session = Session::new(id, simulation, &self.config, now)?;

        self.sessions
            .write()
            .unwrap()
            .insert(id, Arc::new(Mutex::new(session)));
        log::info!("Created session {}", id);
        Ok(id)
    }

    /// Runs `f` with exclusive access to one session.
    pub fn with_session<R>(
        &self,
        id: u64,
        f: impl FnOnce(&mut Session) -> Result<R, SimError>,
    ) -> Result<R, SimError> {
        let session = self
            .sessions
            .read()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(SimError::SessionNotFound(id))?;
        let mut session = session.lock().unwrap();
        f(&mut session)
    }

    pub fn remove(&self, id: u64) -> Result<(), SimError> {
        self.sessions
            .write()
            .unwrap()
            .remove(&id)
            .map(|_| log::info!("Removed session {}", id))
            .ok_or(SimError::SessionNotFound(id))
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }
}
