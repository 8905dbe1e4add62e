use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::expect::ConfigError;

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyACM0";
pub const DEFAULT_BAUD_RATE: u32 = 115200;

/// Transport and collection settings for one test station.
///
/// Passed explicitly into the reception controller and the session, so the
/// matching engine never reads ambient port or timing state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    pub port_name: String,
    pub baud_rate: u32,
    /// Read timeout configured on the OS port handle
    pub open_timeout_ms: u64,
    /// Upper bound of a single bounded read inside the collection loop
    pub poll_interval_ms: u64,
    /// Lines mode only: stop once no byte arrived for this long
    pub idle_timeout_ms: Option<u64>,
    /// Unterminated line data kept before the older half is dropped
    pub max_partial_bytes: usize,
    /// Pause after opening the port before its buffers are cleared
    pub settle_ms: u64,
    /// Breather between two emulated input actions
    pub action_gap_ms: u64,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port_name: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            open_timeout_ms: 1000,
            poll_interval_ms: 50,
            idle_timeout_ms: None,
            max_partial_bytes: 8192,
            settle_ms: 100,
            action_gap_ms: 50,
        }
    }
}

impl SerialConfig {
    /// Defaults for everything but the port name
    pub fn for_port(port_name: impl Into<String>) -> Self {
        Self { port_name: port_name.into(), ..Self::default() }
    }

    /// Parse and validate settings from JSON text
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        let config: SerialConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read settings from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&text)
    }

    /// Reject settings the reception loop cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::InvalidSetting("poll_interval_ms must be greater than 0".into()));
        }
        if self.max_partial_bytes < 2 {
            return Err(ConfigError::InvalidSetting("max_partial_bytes must be at least 2".into()));
        }
        if self.idle_timeout_ms == Some(0) {
            return Err(ConfigError::InvalidSetting("idle_timeout_ms must be greater than 0 when set".into()));
        }
        Ok(())
    }

    /// Upper bound of one bounded read
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Idle stop for lines mode, if configured
    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    /// Pause after each emulated action
    pub fn action_gap(&self) -> Duration {
        Duration::from_millis(self.action_gap_ms)
    }
}
