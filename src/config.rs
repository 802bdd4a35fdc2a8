use crate::sensor::{SensorConfig, build_sensor_configs};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_MIN_DETECTION_MS: u64 = 10_000;
pub const DEFAULT_CROWD_DETECTION_MS: u64 = 15_000;
pub const DEFAULT_CROWD_RESET_MS: u64 = 30_000;
pub const DEFAULT_RANGE_POLL_INTERVAL_MS: u64 = 500;
pub const DEFAULT_REPORT_INTERVAL_MS: u64 = 5_000;
pub const DEFAULT_DISTANCE_THRESHOLD_CM: u16 = 50;
pub const DEFAULT_ECHO_TIMEOUT_US: u64 = 30_000;
pub const DEFAULT_STORE_TIMEOUT_MS: u64 = 5_000;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    pub wifi: WifiSection,
    pub store: StoreSection,
    pub sensors: SensorsSection,
    #[serde(default)]
    pub timing: Option<TimingSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub device_id: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

/// Network credentials. Association is handled by the OS; presence is
/// validated at startup.
#[derive(Debug, Deserialize, Clone)]
pub struct WifiSection {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreSection {
    pub host: String,
    pub auth: String,
    pub current_status_path: String,
    pub history_path: String,
    /// Per-request timeout in milliseconds (default: 5000)
    pub timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SensorsSection {
    /// GPIO pin numbers of the IR presence sensors, in sensor order
    pub ir_pins: Vec<u8>,
    pub trigger_pin: u8,
    pub echo_pin: u8,
    /// Distance below which the range sensor counts as crowd input (default: 50)
    pub distance_threshold_cm: Option<u16>,
    /// Maximum echo wait in microseconds (default: 30000)
    pub echo_timeout_us: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TimingSection {
    pub min_detection_ms: Option<u64>,
    pub crowd_detection_ms: Option<u64>,
    pub crowd_reset_ms: Option<u64>,
    pub range_poll_interval_ms: Option<u64>,
    pub report_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    config.validate()?;
    Ok(config)
}

impl Config {
    /// Startup validation: the device must not run with credentials, pins,
    /// or windows it cannot act on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("app.device_id", &self.app.device_id),
            ("wifi.ssid", &self.wifi.ssid),
            ("wifi.password", &self.wifi.password),
            ("store.host", &self.store.host),
            ("store.auth", &self.store.auth),
            ("store.current_status_path", &self.store.current_status_path),
            ("store.history_path", &self.store.history_path),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} must not be empty")));
            }
        }

        if self.sensors.ir_pins.is_empty() {
            return Err(ConfigError::Invalid(
                "sensors.ir_pins must list at least one pin".to_string(),
            ));
        }
        let mut pins = self.sensors.ir_pins.clone();
        pins.push(self.sensors.trigger_pin);
        pins.push(self.sensors.echo_pin);
        pins.sort_unstable();
        pins.dedup();
        if pins.len() != self.sensors.ir_pins.len() + 2 {
            return Err(ConfigError::Invalid(
                "sensor pin assignments must be distinct".to_string(),
            ));
        }

        let windows = [
            ("timing.min_detection_ms", self.min_detection()),
            ("timing.crowd_detection_ms", self.crowd_detection()),
            ("timing.crowd_reset_ms", self.crowd_reset()),
            ("timing.range_poll_interval_ms", self.range_poll_interval()),
            ("timing.report_interval_ms", self.report_interval()),
        ];
        for (name, window) in windows {
            if window.is_zero() {
                return Err(ConfigError::Invalid(format!("{name} must be positive")));
            }
        }

        Ok(())
    }

    pub fn device_id(&self) -> &str {
        &self.app.device_id
    }

    /// Returns presence sensor configurations built from ir_pins.
    pub fn sensor_configs(&self) -> Vec<SensorConfig> {
        build_sensor_configs(&self.sensors.ir_pins)
    }

    pub fn distance_threshold_cm(&self) -> u16 {
        self.sensors
            .distance_threshold_cm
            .unwrap_or(DEFAULT_DISTANCE_THRESHOLD_CM)
    }

    pub fn echo_timeout(&self) -> Duration {
        Duration::from_micros(self.sensors.echo_timeout_us.unwrap_or(DEFAULT_ECHO_TIMEOUT_US))
    }

    pub fn min_detection(&self) -> Duration {
        self.timing_ms(|t| t.min_detection_ms, DEFAULT_MIN_DETECTION_MS)
    }

    pub fn crowd_detection(&self) -> Duration {
        self.timing_ms(|t| t.crowd_detection_ms, DEFAULT_CROWD_DETECTION_MS)
    }

    pub fn crowd_reset(&self) -> Duration {
        self.timing_ms(|t| t.crowd_reset_ms, DEFAULT_CROWD_RESET_MS)
    }

    pub fn range_poll_interval(&self) -> Duration {
        self.timing_ms(|t| t.range_poll_interval_ms, DEFAULT_RANGE_POLL_INTERVAL_MS)
    }

    pub fn report_interval(&self) -> Duration {
        self.timing_ms(|t| t.report_interval_ms, DEFAULT_REPORT_INTERVAL_MS)
    }

    pub fn store_timeout(&self) -> Duration {
        Duration::from_millis(self.store.timeout_ms.unwrap_or(DEFAULT_STORE_TIMEOUT_MS))
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    fn timing_ms(&self, pick: impl Fn(&TimingSection) -> Option<u64>, default: u64) -> Duration {
        let ms = self
            .timing
            .as_ref()
            .and_then(pick)
            .unwrap_or(default);
        Duration::from_millis(ms)
    }
}
