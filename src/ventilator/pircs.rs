//! PIRCS control commands
//!
//! A command names a parameter (`par`), an interpretation (`int`, `T` for a
//! target value) and an integer value in device units. Pressures and rates
//! arrive in tenths.

use super::{Ventilator, VentilatorSettings};
use crate::error::SimError;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PircsCommand {
    pub com: char,
    pub par: char,
    pub int: char,
    #[serde(rename = "mod", default)]
    pub modifier: i32,
    pub val: i32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PircsError {
    UnknownCommand(char),
    UnknownParameter { par: char, int: char },
    InvalidValue { par: char, val: i32 },
}

impl fmt::Display for PircsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PircsError::UnknownCommand(com) => write!(f, "Unknown command: {}", com),
            PircsError::UnknownParameter { par, int } => {
                write!(f, "Unknown parameter {} with interpretation {}", par, int)
            }
            PircsError::InvalidValue { par, val } => {
                write!(f, "Value {} is not valid for parameter {}", val, par)
            }
        }
    }
}

impl std::error::Error for PircsError {}

/// Reply to a control command: the command echoed back with `ack` set to
/// `S` on success or `X` on failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Acknowledgement {
    #[serde(flatten)]
    pub command: PircsCommand,
    pub ack: char,
    pub err: i32,
}

impl PircsCommand {
    pub fn settings_after(&self, current: &VentilatorSettings) -> Result<VentilatorSettings, PircsError> {
        if self.com != 'C' {
            return Err(PircsError::UnknownCommand(self.com));
        }

        let mut settings = current.clone();
        match (self.par, self.int) {
            ('P', 'T') => settings.pi = (self.val / 10) as f64,
            ('B', 'T') => {
                let rate = self.val / 10;
                if rate <= 0 {
                    return Err(self.invalid());
                }
                settings.rate = rate as f64;
            }
            ('I', 'T') => {
                if self.val <= 0 {
                    return Err(self.invalid());
                }
                settings.ie = 1.0 / (self.val as f64 / 10.0);
            }
            ('F', 'T') => settings.target_flow_ml_per_s = self.val as f64,
            ('M', mode) => settings.mode = mode.to_string(),
            (par, int) => return Err(PircsError::UnknownParameter { par, int }),
        }
        Ok(settings)
    }

    pub fn apply(&self, ventilator: &mut Ventilator) -> Result<(), SimError> {
        let settings = self.settings_after(ventilator.settings())?;
        ventilator.replace_settings(settings)?;
        log::info!("Applied control command {}{}{} val={}", self.com, self.par, self.int, self.val);
        Ok(())
    }

    pub fn acknowledge(&self, result: &Result<(), SimError>) -> Acknowledgement {
        Acknowledgement {
            command: self.clone(),
            ack: if result.is_ok() { 'S' } else { 'X' },
            err: 0,
        }
    }

    fn invalid(&self) -> PircsError {
        PircsError::InvalidValue { par: self.par, val: self.val }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn command(par: char, int: char, val: i32) -> PircsCommand {
        PircsCommand { com: 'C', par, int, modifier: 0, val }
    }

    #[test]
    fn test_target_pressure_in_tenths() {
        let settings = command('P', 'T', 257).settings_after(&VentilatorSettings::default()).unwrap();
        assert_eq!(settings.pi, 25.0);
    }

    #[test]
    fn test_rate_and_ie() {
        let base = VentilatorSettings::default();
        assert_eq!(command('B', 'T', 120).settings_after(&base).unwrap().rate, 12.0);
        assert_eq!(command('I', 'T', 20).settings_after(&base).unwrap().ie, 0.5);
        assert_eq!(command('F', 'T', 4000).settings_after(&base).unwrap().target_flow_ml_per_s, 4000.0);
        assert_eq!(command('M', 'V', 0).settings_after(&base).unwrap().mode, "V");
    }

    #[test]
    fn test_rejects_values_that_break_the_cycle() {
        let base = VentilatorSettings::default();
        assert_eq!(
            command('B', 'T', 5).settings_after(&base),
            Err(PircsError::InvalidValue { par: 'B', val: 5 })
        );
        assert!(command('I', 'T', 0).settings_after(&base).is_err());
    }

    #[test]
    fn test_unknown_parameter_and_command() {
        let base = VentilatorSettings::default();
        assert_eq!(
            command('Z', 'T', 1).settings_after(&base),
            Err(PircsError::UnknownParameter { par: 'Z', int: 'T' })
        );
        let mut query = command('P', 'T', 100);
        query.com = 'Q';
        assert_eq!(query.settings_after(&base), Err(PircsError::UnknownCommand('Q')));
    }

    #[test]
    fn test_apply_and_acknowledge() {
        let mut ventilator = Ventilator::new(VentilatorSettings::default()).unwrap();
        let cmd = command('P', 'T', 200);
        let result = cmd.apply(&mut ventilator);
        assert_eq!(ventilator.settings().pi, 20.0);
        assert_eq!(cmd.acknowledge(&result).ack, 'S');

        let failed = command('Q', 'T', 0);
        let result = failed.apply(&mut ventilator);
        assert_eq!(failed.acknowledge(&result).ack, 'X');
    }

    #[test]
    fn test_pressure_beyond_curve_range_is_refused() {
        let mut ventilator = Ventilator::new(VentilatorSettings::default()).unwrap();
        let cmd = command('P', 'T', 1500);
        let result = cmd.apply(&mut ventilator);
        assert!(matches!(result, Err(SimError::InvalidParameter(_))));
        assert_eq!(cmd.acknowledge(&result).ack, 'X');
        assert_eq!(ventilator.settings().pi, 15.0);
    }

    #[test]
    fn test_json_field_names() {
        let cmd: PircsCommand =
            serde_json::from_str(r#"{"com":"C","par":"P","int":"T","mod":0,"val":250}"#).unwrap();
        assert_eq!(cmd, command('P', 'T', 250));
    }
}
