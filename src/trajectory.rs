//! Append-only snapshot log
//!
//! Patient and ventilator each record one immutable status per step. The log
//! is only ever extended, and snapshots must arrive in time order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A snapshot that carries its own simulation time in milliseconds.
pub trait Timestamped {
    fn time_ms(&self) -> f64;
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrajectoryError {
    OutOfOrder { latest_ms: f64, rejected_ms: f64 },
}

impl fmt::Display for TrajectoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrajectoryError::OutOfOrder { latest_ms, rejected_ms } => write!(
                f,
                "Snapshot at {} ms is earlier than the latest entry at {} ms",
                rejected_ms, latest_ms
            ),
        }
    }
}

impl std::error::Error for TrajectoryError {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Trajectory<T> {
    entries: Vec<T>,
}

impl<T> Default for Trajectory<T> {
    fn default() -> Self {
        Trajectory { entries: Vec::new() }
    }
}

impl<T: Timestamped> Trajectory<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, snapshot: T) -> Result<(), TrajectoryError> {
        if let Some(latest) = self.entries.last() {
            if snapshot.time_ms() < latest.time_ms() {
                return Err(TrajectoryError::OutOfOrder {
                    latest_ms: latest.time_ms(),
                    rejected_ms: snapshot.time_ms(),
                });
            }
        }
        self.entries.push(snapshot);
        Ok(())
    }

    pub fn latest(&self) -> Option<&T> {
        self.entries.last()
    }

    /// The most recent `n` snapshots, oldest first.
    pub fn last_n(&self, n: usize) -> &[T] {
        let start = self.entries.len().saturating_sub(n);
        &self.entries[start..]
    }

    /// Snapshots with `start_ms <= time < end_ms`.
    pub fn range(&self, start_ms: f64, end_ms: f64) -> &[T] {
        let from = self.entries.partition_point(|s| s.time_ms() < start_ms);
        let to = self.entries.partition_point(|s| s.time_ms() < end_ms);
        &self.entries[from..to.max(from)]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a, T> IntoIterator for &'a Trajectory<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
