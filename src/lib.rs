//! lungsim: a coupled ventilator/patient respiratory mechanics simulator
//!
//! A pressure-controlled ventilator and a single-compartment patient are
//! stepped together in discrete time, exchanging mouth pressure every tick.
//! The patient's trajectory is re-encoded as device telegrams for monitors.
//!
//! - [`curves`]: pressure/volume transfer curves and their inverses
//! - [`patient`]: airway resistance and lung volume integration
//! - [`ventilator`]: breath phase state machine and control commands
//! - [`simulation`]: coupled stepping, scenarios, live sessions
//! - [`telegram`]: device telegram encoding

pub mod api;
pub mod config;
pub mod curves;
pub mod error;
pub mod patient;
pub mod simulation;
pub mod telegram;
pub mod trajectory;
pub mod ventilator;

pub use error::SimError;
pub use patient::{Patient, PatientParams, PatientStatus};
pub use simulation::{RunSpan, Simulation};
pub use telegram::{Telegram, TelegramEncoder};
pub use ventilator::{Ventilator, VentilatorSettings, VentilatorStatus};
