//! Configuration System using Figment
//!
//! Configuration is layered, later sources overriding earlier ones:
//! 1. Built-in defaults ([`AppConfig::default`]), a complete working setup
//! 2. TOML file (default `config/spectrum_daq.toml`, optional)
//! 3. Environment variables prefixed with `SPECTRUM_DAQ_`, nested keys split
//!    on a double underscore
//!
//! # Example
//! ```no_run
//! use spectrum_daq::config::AppConfig;
//!
//! // SPECTRUM_DAQ_FIFO__CAPACITY=1024 overrides fifo.capacity
//! let config = AppConfig::load()?;
//! config.validate()?;
//! println!("queue capacity: {}", config.fifo.capacity);
//! # Ok::<(), spectrum_daq::error::DaqError>(())
//! ```

use crate::data::waveform::Waveform;
use crate::error::{AppResult, DaqError};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default configuration file location.
pub const DEFAULT_CONFIG_PATH: &str = "config/spectrum_daq.toml";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "SPECTRUM_DAQ_";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Application settings
    pub application: ApplicationConfig,
    /// Sample queue settings
    pub fifo: FifoConfig,
    /// Fast (producer) context settings
    pub acquisition: AcquisitionConfig,
    /// Slow (host) context settings
    pub host: HostConfig,
    /// Host transport settings
    pub transport: TransportConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log output format (pretty, compact, json)
    pub log_format: String,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "spectrum-daq".to_string(),
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
        }
    }
}

/// Sample queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FifoConfig {
    /// Slot count (power of two)
    pub capacity: usize,
}

impl Default for FifoConfig {
    fn default() -> Self {
        Self {
            capacity: default_capacity(),
        }
    }
}

/// Acquisition (fast context) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Start acquiring as soon as reset is released
    pub auto_start: bool,
    /// Step period of the fast context in microseconds
    pub step_period_us: u64,
    /// Waveform table driven into the signal chain
    pub waveform: Waveform,
    /// Sampling frequency of the waveform table in MHz
    pub sampling_mhz: f64,
    /// Transform block size (power of two)
    pub frame_len: usize,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            auto_start: true,
            step_period_us: 10,
            waveform: Waveform::Sine,
            sampling_mhz: 100.0,
            frame_len: default_frame_len(),
        }
    }
}

impl AcquisitionConfig {
    /// Fast context step period.
    pub fn step_period(&self) -> Duration {
        Duration::from_micros(self.step_period_us)
    }

    /// Sampling frequency in Hz.
    pub fn sampling_hz(&self) -> f64 {
        self.sampling_mhz * 1e6
    }

    /// Frequency spacing between transform bins in Hz.
    pub fn bin_hz(&self) -> f64 {
        self.sampling_hz() / self.frame_len as f64
    }
}

/// Host protocol (slow context) configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Step period of the slow context in microseconds
    pub step_period_us: u64,
    /// Slow steps the transport stays busy per transmitted byte
    pub tx_frame_steps: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            step_period_us: 40,
            tx_frame_steps: 1,
        }
    }
}

impl HostConfig {
    /// Slow context step period.
    pub fn step_period(&self) -> Duration {
        Duration::from_micros(self.step_period_us)
    }
}

/// Transport kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// TCP socket standing in for the serial link
    #[default]
    Tcp,
    /// Physical serial port (requires the `serial` feature)
    Serial,
}

/// Host transport configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Transport kind
    pub kind: TransportKind,
    /// TCP address (listen address for `serve`, peer for `acquire`)
    pub address: String,
    /// Serial port path (e.g. "/dev/ttyUSB0", "COM3")
    pub serial_port: Option<String>,
    /// Serial baud rate
    pub baud_rate: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::Tcp,
            address: "127.0.0.1:5025".to_string(),
            serial_port: None,
            baud_rate: 230_400,
        }
    }
}

fn default_capacity() -> usize {
    512
}

fn default_frame_len() -> usize {
    512
}

impl AppConfig {
    /// Load configuration from the default file and environment variables.
    pub fn load() -> AppResult<Self> {
        Self::load_from(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific file path.
    ///
    /// A missing file is not an error; defaults and environment still apply.
    pub fn load_from<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let config = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        let valid_formats = ["pretty", "compact", "json"];
        if !valid_formats.contains(&self.application.log_format.to_lowercase().as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_format '{}'. Must be one of: {}",
                self.application.log_format,
                valid_formats.join(", ")
            )));
        }

        if !self.fifo.capacity.is_power_of_two() {
            return Err(DaqError::Configuration(format!(
                "fifo.capacity {} must be a non-zero power of two",
                self.fifo.capacity
            )));
        }

        if !self.acquisition.frame_len.is_power_of_two() {
            return Err(DaqError::Configuration(format!(
                "acquisition.frame_len {} must be a non-zero power of two",
                self.acquisition.frame_len
            )));
        }

        if self.acquisition.sampling_mhz <= 0.0 {
            return Err(DaqError::Configuration(format!(
                "acquisition.sampling_mhz {} must be positive",
                self.acquisition.sampling_mhz
            )));
        }

        if self.acquisition.step_period_us == 0 || self.host.step_period_us == 0 {
            return Err(DaqError::Configuration(
                "step periods must be at least 1 us".to_string(),
            ));
        }

        if self.host.tx_frame_steps == 0 {
            return Err(DaqError::Configuration(
                "host.tx_frame_steps must be at least 1".to_string(),
            ));
        }

        if self.transport.kind == TransportKind::Serial && self.transport.serial_port.is_none() {
            return Err(DaqError::Configuration(
                "transport.kind = \"serial\" requires transport.serial_port".to_string(),
            ));
        }

        Ok(())
    }

    /// Render as TOML, e.g. to seed a configuration file.
    pub fn to_toml(&self) -> AppResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| DaqError::Configuration(format!("Failed to render config: {e}")))
    }
}
