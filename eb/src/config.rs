//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::supervisor::SupervisorConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Supervisor timing and queue sizes
    pub supervisor: SupervisorConfig,

    /// Scripted engine used by `eb simulate`
    pub simulation: SimulationConfig,
}

impl Config {
    /// Validate configuration before use
    pub fn validate(&self) -> Result<()> {
        let supervisor = &self.supervisor;
        if supervisor.default_wait_timeout_ms == 0 {
            return Err(eyre::eyre!("supervisor.default-wait-timeout-ms must be positive"));
        }
        if supervisor.default_frame_interval_ms == 0 {
            return Err(eyre::eyre!("supervisor.default-frame-interval-ms must be positive"));
        }
        if supervisor.lane_buffer == 0 || supervisor.sample_queue_capacity == 0 || supervisor.event_capacity == 0 {
            return Err(eyre::eyre!("supervisor queue capacities must be non-zero"));
        }
        if self.simulation.period_ms == 0 {
            return Err(eyre::eyre!("simulation.period-ms must be positive"));
        }
        if self.simulation.ecu_timeout_ms <= 0 {
            return Err(eyre::eyre!("simulation.ecu-timeout-ms must be positive"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .ecubridge.yml
        let local_config = PathBuf::from(".ecubridge.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/ecubridge/ecubridge.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("ecubridge").join("ecubridge.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Scripted engine parameters for `eb simulate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Spacing of scripted samples
    #[serde(rename = "period-ms", default = "default_period_ms")]
    pub period_ms: u64,

    /// Samples emitted before the script completes
    #[serde(default = "default_samples")]
    pub samples: usize,

    /// Stop emitting after this many samples and hang
    #[serde(rename = "stall-after", default)]
    pub stall_after: Option<usize>,

    /// Frame time of the simulated ECU record
    #[serde(rename = "ecu-frame-ms", default = "default_ecu_frame_ms")]
    pub ecu_frame_ms: i32,

    /// Flashing timeout of the simulated ECU record
    #[serde(rename = "ecu-timeout-ms", default = "default_ecu_timeout_ms")]
    pub ecu_timeout_ms: i64,

    /// Per-frame bonus flag of the simulated ECU record
    #[serde(rename = "per-frame", default)]
    pub per_frame: bool,
}

fn default_period_ms() -> u64 {
    debug!("default_period_ms: called");
    50
}

fn default_samples() -> usize {
    debug!("default_samples: called");
    40
}

fn default_ecu_frame_ms() -> i32 {
    debug!("default_ecu_frame_ms: called");
    720
}

fn default_ecu_timeout_ms() -> i64 {
    debug!("default_ecu_timeout_ms: called");
    6000
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            period_ms: default_period_ms(),
            samples: default_samples(),
            stall_after: None,
            ecu_frame_ms: default_ecu_frame_ms(),
            ecu_timeout_ms: default_ecu_timeout_ms(),
            per_frame: false,
        }
    }
}
