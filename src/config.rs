use crate::patient::PatientParams;
use crate::ventilator::VentilatorSettings;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub simulation: SimulationConfig,
    pub patient: PatientParams,
    pub ventilator: VentilatorSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        ApiConfig {
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Step size for live sessions, in ms
    pub sample_rate_ms: u64,
    /// Upper bound on samples returned by one data request
    pub max_samples: usize,
    /// Upper bound on steps in a single run
    pub max_iterations: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            sample_rate_ms: 25,
            max_samples: 1000,
            max_iterations: 1_000_000,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "Failed to read config: {}", msg),
            ConfigError::Parse(msg) => write!(f, "Failed to parse config: {}", msg),
            ConfigError::Invalid(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

impl Config {
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(content)
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.simulation.sample_rate_ms == 0 {
            return Err(ConfigError::Invalid("sample_rate_ms must be positive".to_string()));
        }
        if self.simulation.max_samples == 0 {
            return Err(ConfigError::Invalid("max_samples must be positive".to_string()));
        }
        self.patient
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        self.ventilator
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    Config::from_yaml(&content)
}
