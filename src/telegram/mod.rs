//! Device telegrams
//!
//! Each patient snapshot becomes two measurement telegrams, pressure then
//! flow, with integer values in device units:
//! - pressure in mmH2O (cmH2O x 10)
//! - flow in ml/min (l/s x 60000)

use crate::patient::PatientStatus;
use crate::trajectory::Trajectory;
use serde::{Deserialize, Serialize};
use std::fmt;

pub const PRESSURE_SCALE: f64 = 10.0;
pub const FLOW_SCALE: f64 = 60.0 * 1000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    #[serde(rename = "M")]
    Measurement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MeasurementType {
    #[serde(rename = "P")]
    Pressure,
    #[serde(rename = "F")]
    Flow,
}

/// Sensor position in the breathing circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    #[serde(rename = "I")]
    Inspiratory,
    #[serde(rename = "E")]
    Expiratory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Telegram {
    pub event: EventKind,
    #[serde(rename = "type")]
    pub measurement: MeasurementType,
    #[serde(rename = "loc")]
    pub location: Location,
    pub ms: i64,
    pub val: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TelegramError {
    Malformed { field: &'static str, time: f64, value: f64 },
}

impl fmt::Display for TelegramError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelegramError::Malformed { field, time, value } => write!(
                f,
                "Snapshot at {} ms has unusable {}: {}",
                time, field, value
            ),
        }
    }
}

impl std::error::Error for TelegramError {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelegramEncoder {
    location: Location,
    time_offset_ms: f64,
}

impl Default for TelegramEncoder {
    fn default() -> Self {
        TelegramEncoder {
            location: Location::Inspiratory,
            time_offset_ms: 0.0,
        }
    }
}

impl TelegramEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_location(mut self, location: Location) -> Self {
        self.location = location;
        self
    }

    /// Added to every snapshot time, e.g. to stamp simulation time onto a
    /// wall clock.
    pub fn with_time_offset(mut self, offset_ms: f64) -> Self {
        self.time_offset_ms = offset_ms;
        self
    }

    /// Pressure telegram followed by flow telegram. Nothing is emitted if any
    /// field of the snapshot is unusable.
    pub fn encode_one(&self, status: &PatientStatus) -> Result<[Telegram; 2], TelegramError> {
        let ms = checked_integer("time", status.time, (status.time + self.time_offset_ms).trunc())?;
        let pressure = device_value("pressure_mouth", status.time, status.pressure_mouth, PRESSURE_SCALE)?;
        let flow = device_value("flow", status.time, status.flow, FLOW_SCALE)?;

        Ok([
            self.telegram(MeasurementType::Pressure, ms, pressure),
            self.telegram(MeasurementType::Flow, ms, flow),
        ])
    }

    pub fn encode(&self, snapshots: &[PatientStatus]) -> Result<Vec<Telegram>, TelegramError> {
        let mut telegrams = Vec::with_capacity(snapshots.len() * 2);
        for status in snapshots {
            telegrams.extend(self.encode_one(status)?);
        }
        Ok(telegrams)
    }

    /// Encodes the trailing `n` snapshots of a log.
    pub fn encode_window(
        &self,
        log: &Trajectory<PatientStatus>,
        n: usize,
    ) -> Result<Vec<Telegram>, TelegramError> {
        self.encode(log.last_n(n))
    }

    fn telegram(&self, measurement: MeasurementType, ms: i64, val: i64) -> Telegram {
        Telegram {
            event: EventKind::Measurement,
            measurement,
            location: self.location,
            ms,
            val,
        }
    }
}

/// Scales into integer device units, rounding half to even.
fn device_value(field: &'static str, time: f64, value: f64, scale: f64) -> Result<i64, TelegramError> {
    checked_integer(field, time, (value * scale).round_ties_even())
        .map_err(|_| TelegramError::Malformed { field, time, value })
}

fn checked_integer(field: &'static str, time: f64, value: f64) -> Result<i64, TelegramError> {
    if !value.is_finite() || value.abs() >= i64::MAX as f64 {
        return Err(TelegramError::Malformed { field, time, value });
    }
    Ok(value as i64)
}
