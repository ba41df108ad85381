//! Application configuration.
//!
//! Loaded from `config.toml` in the platform data directory, or from an explicit path.
//! Every section is optional; missing values take their defaults.

use crate::sensors::decoder::DEFAULT_WHEEL_CIRCUMFERENCE_M;
use crate::sensors::supervisor::{SupervisorConfig, DEFAULT_POLL_INTERVAL, DEFAULT_RETRY_BOUND};
use crate::sensors::types::{Metric, SensorAddress};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Largest accepted wheel circumference in meters
const MAX_WHEEL_CIRCUMFERENCE_M: f64 = 5.0;

/// Common road tyre sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TireSize {
    #[serde(rename = "700x23")]
    Tire700x23,
    #[default]
    #[serde(rename = "700x25")]
    Tire700x25,
    #[serde(rename = "700x28")]
    Tire700x28,
}

impl TireSize {
    /// Rolling circumference in meters
    pub fn circumference_m(&self) -> f64 {
        match self {
            TireSize::Tire700x23 => 2.096,
            TireSize::Tire700x25 => DEFAULT_WHEEL_CIRCUMFERENCE_M,
            TireSize::Tire700x28 => 2.127,
        }
    }
}

impl std::fmt::Display for TireSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TireSize::Tire700x23 => write!(f, "700x23C"),
            TireSize::Tire700x25 => write!(f, "700x25C"),
            TireSize::Tire700x28 => write!(f, "700x28C"),
        }
    }
}

/// Wheel size, as a tyre preset or a measured circumference.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WheelSettings {
    Tire { tire: TireSize },
    Measured { circumference_m: f64 },
}

impl WheelSettings {
    pub fn circumference_m(&self) -> f64 {
        match self {
            WheelSettings::Tire { tire } => tire.circumference_m(),
            WheelSettings::Measured { circumference_m } => *circumference_m,
        }
    }
}

impl Default for WheelSettings {
    fn default() -> Self {
        WheelSettings::Tire {
            tire: TireSize::default(),
        }
    }
}

fn default_connection_retries() -> u32 {
    DEFAULT_RETRY_BOUND
}

fn default_retry_delay_ms() -> u64 {
    2000
}

/// One configured sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSettings {
    /// Name used in logs and events
    pub name: String,
    /// Metrics this sensor supplies
    pub metrics: Vec<Metric>,
    /// Connection attempts before giving up
    #[serde(default = "default_connection_retries")]
    pub connection_retries: u32,
    /// Wait between attempts in milliseconds
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    /// Wheel size for speed and distance
    #[serde(default)]
    pub wheel: WheelSettings,
    /// Transport and address
    pub transport: SensorAddress,
}

impl SensorSettings {
    pub fn new(name: impl Into<String>, metrics: Vec<Metric>, transport: SensorAddress) -> Self {
        Self {
            name: name.into(),
            metrics,
            connection_retries: default_connection_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            wheel: WheelSettings::default(),
            transport,
        }
    }

    /// Supervisor parameters for this sensor
    pub fn supervisor_config(&self) -> SupervisorConfig {
        SupervisorConfig {
            retry_bound: self.connection_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
            poll_interval: DEFAULT_POLL_INTERVAL,
            wheel_circumference_m: self.wheel.circumference_m(),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid =
            |reason: &str| ConfigError::Invalid(format!("sensor '{}': {}", self.name, reason));

        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("sensor name must not be empty".to_string()));
        }
        if self.metrics.is_empty() {
            return Err(invalid("at least one metric is required"));
        }
        if self.connection_retries < 1 {
            return Err(invalid("connection_retries must be at least 1"));
        }
        let circumference = self.wheel.circumference_m();
        if !(circumference > 0.0 && circumference <= MAX_WHEEL_CIRCUMFERENCE_M) {
            return Err(invalid("wheel circumference must be in (0, 5] meters"));
        }
        Ok(())
    }
}

/// Recording settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingSettings {
    /// Directory for FIT files
    pub output_dir: PathBuf,
    /// Time between samples in milliseconds
    pub sample_interval_ms: u64,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            sample_interval_ms: 1000,
        }
    }
}

/// Overlay display settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplaySettings {
    /// Time between refreshes in milliseconds
    pub refresh_interval_ms: u64,
    pub show_time: bool,
    pub show_heart_rate: bool,
    pub show_power: bool,
    pub show_cadence: bool,
    pub show_speed: bool,
    pub show_distance: bool,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 500,
            show_time: true,
            show_heart_rate: true,
            show_power: true,
            show_cadence: true,
            show_speed: true,
            show_distance: true,
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Application version
    pub version: String,
    /// Data directory path
    #[serde(skip)]
    pub data_dir: PathBuf,
    /// Configured sensors, in priority order (later sensors win shared metrics)
    pub sensors: Vec<SensorSettings>,
    /// Recording settings
    pub recording: RecordingSettings,
    /// Display settings
    pub display: DisplaySettings,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            data_dir: PathBuf::new(),
            sensors: Vec::new(),
            recording: RecordingSettings::default(),
            display: DisplaySettings::default(),
        }
    }
}

impl AppConfig {
    /// Check every value is usable.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (i, sensor) in self.sensors.iter().enumerate() {
            sensor.validate()?;
            if self.sensors[..i].iter().any(|s| s.name == sensor.name) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate sensor name '{}'",
                    sensor.name
                )));
            }
        }
        if self.recording.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "recording.sample_interval_ms must be positive".to_string(),
            ));
        }
        if self.display.refresh_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "display.refresh_interval_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Get the application data directory.
pub fn get_data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "providenceit", "trainerlink")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Get the configuration file path.
pub fn get_config_path() -> PathBuf {
    get_data_dir().join("config.toml")
}

/// Load application configuration from the default location.
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from(&get_config_path())
}

/// Load application configuration from `path`. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    if !path.exists() {
        tracing::info!(path = %path.display(), "No config file, using defaults");
        return Ok(AppConfig {
            data_dir: get_data_dir(),
            ..Default::default()
        });
    }

    let content =
        std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;

    let mut config: AppConfig =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    config.validate()?;
    config.data_dir = get_data_dir();

    tracing::debug!(path = %path.display(), sensors = config.sensors.len(), "Loaded config");
    Ok(config)
}

/// Save application configuration to the default location.
pub fn save_config(config: &AppConfig) -> Result<(), ConfigError> {
    save_config_to(config, &get_config_path())
}

/// Save application configuration to `path`.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
    }

    let content =
        toml::to_string_pretty(config).map_err(|e| ConfigError::SerializeError(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| ConfigError::IoError(e.to_string()))?;

    Ok(())
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
