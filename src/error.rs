use crate::config::ConfigError;
use crate::curves::CurveError;
use crate::telegram::TelegramError;
use crate::trajectory::TrajectoryError;
use crate::ventilator::pircs::PircsError;
use std::fmt;

#[derive(Debug)]
pub enum SimError {
    Curve(CurveError),
    Trajectory(TrajectoryError),
    Telegram(TelegramError),
    Pircs(PircsError),
    Config(ConfigError),
    InvalidParameter(String),
    InvalidTimeStep(f64),
    TooManySteps { requested: u64, limit: u64 },
    SessionNotFound(u64),
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SimError::Curve(err) => write!(f, "Curve error: {}", err),
            SimError::Trajectory(err) => write!(f, "Trajectory error: {}", err),
            SimError::Telegram(err) => write!(f, "Telegram error: {}", err),
            SimError::Pircs(err) => write!(f, "Control error: {}", err),
            SimError::Config(err) => write!(f, "Config error: {}", err),
            SimError::InvalidParameter(msg) => write!(f, "Invalid parameter: {}", msg),
            SimError::InvalidTimeStep(dt) => write!(f, "Invalid time step: {} ms", dt),
            SimError::TooManySteps { requested, limit } => write!(
                f,
                "Run needs {} steps, limit is {}",
                requested, limit
            ),
            SimError::SessionNotFound(id) => write!(f, "Session not found: {}", id),
        }
    }
}

impl std::error::Error for SimError {}

impl From<CurveError> for SimError {
    fn from(error: CurveError) -> Self {
        SimError::Curve(error)
    }
}

impl From<TrajectoryError> for SimError {
    fn from(error: TrajectoryError) -> Self {
        SimError::Trajectory(error)
    }
}

impl From<TelegramError> for SimError {
    fn from(error: TelegramError) -> Self {
        SimError::Telegram(error)
    }
}

impl From<PircsError> for SimError {
    fn from(error: PircsError) -> Self {
        SimError::Pircs(error)
    }
}

impl From<ConfigError> for SimError {
    fn from(error: ConfigError) -> Self {
        SimError::Config(error)
    }
}

/// Rejects negative, NaN and infinite time increments.
pub(crate) fn check_time_step(dt: f64) -> Result<(), SimError> {
    if dt.is_finite() && dt >= 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidTimeStep(dt))
    }
}

pub(crate) fn check_positive(name: &str, value: f64) -> Result<(), SimError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(SimError::InvalidParameter(format!("{} must be positive, got {}", name, value)))
    }
}
