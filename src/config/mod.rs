//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// TCP address the cars and base stations connect to
    pub device_addr: SocketAddr,
    /// HTTP address of the operator control panel
    pub control_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit JSON log lines instead of the human readable format
    pub json_logs: bool,
    /// Optional JSON device directory; the built-in tables are used when unset
    pub directory_path: Option<PathBuf>,
    /// Capacity of the ingestion -> game loop event queue
    pub event_queue_capacity: usize,
    /// Game timing rules
    pub game: GameConfig,
}

/// Timing parameters of the game rules
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GameConfig {
    /// How long a tagged car stays disabled
    pub penalty_duration: Duration,
    /// How long a safe car stays safe without a corroborating sighting
    pub safe_zone_timeout: Duration,
    /// Motion watchdog for the control panel; `None` disables it
    pub command_timeout: Option<Duration>,
    /// Upper bound on how long the loop waits for an event before sweeping timers
    pub tick_interval: Duration,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            penalty_duration: Duration::from_secs(10),
            safe_zone_timeout: Duration::from_secs(1),
            command_timeout: Some(Duration::from_secs(1)),
            tick_interval: Duration::from_millis(50),
        }
    }
}

impl GameConfig {
    /// Smallest timer the sweep has to honour
    pub fn smallest_timeout(&self) -> Duration {
        let mut smallest = self.penalty_duration.min(self.safe_zone_timeout);
        if let Some(command_timeout) = self.command_timeout {
            smallest = smallest.min(command_timeout);
        }
        smallest
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            control_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            json_logs: false,
            directory_path: None,
            event_queue_capacity: 1024,
            game: GameConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let device_addr = env::var("DEVICE_ADDR").unwrap_or_else(|_| "0.0.0.0:5000".to_string());
        let control_addr =
            env::var("CONTROL_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        let command_timeout_ms: u64 = parse_var("COMMAND_TIMEOUT_MS", 1000)?;
        let tick_interval_ms: u64 = parse_var("TICK_INTERVAL_MS", 50)?;
        if tick_interval_ms == 0 {
            return Err(ConfigError::Invalid("TICK_INTERVAL_MS"));
        }
        let event_queue_capacity: usize = parse_var("EVENT_QUEUE_CAPACITY", 1024)?;
        if event_queue_capacity == 0 {
            return Err(ConfigError::Invalid("EVENT_QUEUE_CAPACITY"));
        }

        Ok(Self {
            device_addr: device_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("DEVICE_ADDR"))?,
            control_addr: control_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress("CONTROL_ADDR"))?,

            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            json_logs: env::var("LOG_FORMAT")
                .map(|format| format.eq_ignore_ascii_case("json"))
                .unwrap_or(false),

            directory_path: env::var("DEVICE_DIRECTORY").ok().map(PathBuf::from),
            event_queue_capacity,

            game: GameConfig {
                penalty_duration: Duration::from_secs(parse_var("PENALTY_DURATION_SECS", 10)?),
                safe_zone_timeout: Duration::from_millis(parse_var("SAFE_ZONE_TIMEOUT_MS", 1000)?),
                command_timeout: (command_timeout_ms > 0)
                    .then(|| Duration::from_millis(command_timeout_ms)),
                tick_interval: Duration::from_millis(tick_interval_ms),
            },
        })
    }
}

/// Read an optional numeric variable, falling back to `default` when unset
fn parse_var<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(default),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Invalid socket address in {0}")]
    InvalidAddress(&'static str),
}
