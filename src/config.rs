//! ==============================================================================
//! config.rs - Station Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `station.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - SerialConfig: Port, line speed and the settle delay between query and read.
//!     - PollingConfig: How often both gauges are queried.
//!     - GaugesConfig: Labels and unit used in status lines and archive headers.
//!     - PublishConfig: External status endpoint and its rate limit.
//!     - RotationConfig: Where archives go and how often the buffer rotates.
//!     - ProtocolConfig: Optional strict response checking.
//!     - LoggingConfig: Log level and whether readings are logged at info.
//!
//! ==============================================================================

use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// longest rotation period accepted, one leap year
pub const MAX_ROTATION_HOURS: u64 = 24 * 366;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct StationConfig {
    pub serial: SerialConfig,
    pub polling: PollingConfig,
    pub gauges: GaugesConfig,
    pub publish: PublishConfig,
    pub rotation: RotationConfig,
    pub protocol: ProtocolConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
    /// operation timeout handed to the serial driver
    pub timeout_ms: u64,
    /// wait between sending a query and reading the answer
    pub settle_ms: u64,
    /// answer queries from simulated gauges instead of opening the port
    pub simulate: bool,
    /// simulated gauges leave every n-th query unanswered
    pub simulate_miss_every: Option<u64>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: "/dev/ttyUSB0".to_string(),
            baud_rate: 19200,
            timeout_ms: 3000,
            settle_ms: 500,
            simulate: false,
            simulate_miss_every: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PollingConfig {
    pub interval_seconds: u64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self { interval_seconds: 10 }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GaugesConfig {
    pub first_label: String,
    pub second_label: String,
    pub unit: String,
}

impl Default for GaugesConfig {
    fn default() -> Self {
        Self {
            first_label: "Prep".to_string(),
            second_label: "LT".to_string(),
            unit: "mBar".to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct PublishConfig {
    pub enabled: bool,
    pub url: String,
    pub auth_token: Option<String>,
    pub min_interval_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: String::new(),
            auth_token: None,
            min_interval_seconds: 60,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct RotationConfig {
    pub output_dir: PathBuf,
    pub period_hours: u64,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
            period_hours: 24,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct ProtocolConfig {
    /// reject answers whose crc trailer does not match (off by default)
    pub verify_response_crc: bool,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub show_sensor_data: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_sensor_data: true }
    }
}

/// per-run overrides from the command line
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub interval_seconds: Option<u64>,
    pub port: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub simulate: bool,
    pub no_publish: bool,
}

impl StationConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let config: StationConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;

        Ok(config)
    }

    /// Load with default fallback
    pub fn load_or_default() -> Self {
        let paths = [
            PathBuf::from("config").join("station.toml"),
            PathBuf::from("..").join("config").join("station.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        println!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        println!("[CONFIG] Warning: Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        println!("[CONFIG] Warning: No config file found - using defaults");
        Self::default()
    }

    pub fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(interval) = overrides.interval_seconds {
            tracing::debug!("Overriding polling interval from command line: {}s", interval);
            self.polling.interval_seconds = interval;
        }
        if let Some(port) = &overrides.port {
            tracing::debug!("Overriding serial port from command line: {}", port);
            self.serial.port = port.clone();
        }
        if let Some(dir) = &overrides.output_dir {
            tracing::debug!("Overriding output directory from command line: {}", dir.display());
            self.rotation.output_dir = dir.clone();
        }
        if overrides.simulate {
            self.serial.simulate = true;
        }
        if overrides.no_publish {
            self.publish.enabled = false;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.polling.interval_seconds == 0 {
            return Err(ConfigError::ZeroInterval);
        }
        if self.serial.settle_ms == 0 {
            return Err(ConfigError::ZeroSettle);
        }
        if self.rotation.period_hours == 0 {
            return Err(ConfigError::ZeroRotationPeriod);
        }
        if self.rotation.period_hours > MAX_ROTATION_HOURS {
            return Err(ConfigError::RotationPeriodTooLong(MAX_ROTATION_HOURS));
        }
        if self.publish.enabled && self.publish.url.trim().is_empty() {
            return Err(ConfigError::MissingPublishUrl);
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.polling.interval_seconds)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.serial.settle_ms)
    }

    pub fn rotation_period(&self) -> Duration {
        Duration::from_secs(self.rotation.period_hours.saturating_mul(3600))
    }

    pub fn publish_interval(&self) -> Duration {
        Duration::from_secs(self.publish.min_interval_seconds)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let publish = if self.publish.enabled { self.publish.url.as_str() } else { "disabled" };
        let port = if self.serial.simulate { "simulated" } else { self.serial.port.as_str() };
        println!("┌─────────────────────────────────────────┐");
        println!("│          STATION CONFIGURATION          │");
        println!("├─────────────────────────────────────────┤");
        println!("│ Port: {} @ {} baud", port, self.serial.baud_rate);
        println!("│ Poll Interval: {}s", self.polling.interval_seconds);
        println!("│ Gauges: {} / {} ({})", self.gauges.first_label, self.gauges.second_label, self.gauges.unit);
        println!("│ Publish: {} (every {}s max)", publish, self.publish.min_interval_seconds);
        println!("│ Archive: {} (every {}h)", self.rotation.output_dir.display(), self.rotation.period_hours);
        println!("│ Log Level: {}", self.logging.level);
        println!("└─────────────────────────────────────────┘");
    }
}
