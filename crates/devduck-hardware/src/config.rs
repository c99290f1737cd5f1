//! Duck configuration: serial link settings and talking-animation timing.
//!
//! Precedence: built-in defaults < TOML file (`DEVDUCK_CONFIG`, default
//! `config/devduck.toml`) < `DEVDUCK_*` env (`__` between sections) < `DUCK_PORT`.
//!
//! | Env | Default | Description |
//! |-----|---------|-------------|
//! | DUCK_PORT | unset | Explicit serial port; skips enumeration. |
//! | DEVDUCK_HARDWARE__BAUD_RATE | 9600 | Link speed. |
//! | DEVDUCK_HARDWARE__SIMULATE | false | Use the in-memory wire instead of a real port. |
//! | DEVDUCK_ANIMATION__STEP_WAIT_MS | 2000 | Pause between talking-loop motions. |

use crate::command::GestureCommand;
use crate::error::HardwareResult;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_FALLBACK_PORT: &str = "/dev/cu.usbmodem11101";
pub const DEFAULT_CONFIG_PATH: &str = "config/devduck.toml";

/// Substrings (lowercase) that identify a likely duck controller.
pub const DEFAULT_FINGERPRINTS: [&str; 4] = ["usbmodem", "usbserial", "arduino", "wchusbserial"];

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DuckConfig {
    pub hardware: HardwareConfig,
    pub animation: AnimationConfig,
}

/// Serial link settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    /// Operator-supplied port; wins over enumeration.
    pub port: Option<String>,
    pub baud_rate: u32,
    /// Last-resort device path, used only if it exists.
    pub fallback_port: Option<String>,
    pub fingerprints: Vec<String>,
    pub write_timeout_ms: u64,
    /// Microcontroller reset time after the port opens.
    pub settle_delay_ms: u64,
    /// Back-off after a failed discovery/connect before trying again.
    pub reconnect_cooldown_ms: u64,
    pub queue_capacity: usize,
    /// Run against the in-memory wire (no hardware needed).
    pub simulate: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            fallback_port: Some(DEFAULT_FALLBACK_PORT.to_string()),
            fingerprints: DEFAULT_FINGERPRINTS.iter().map(|s| s.to_string()).collect(),
            write_timeout_ms: 1000,
            settle_delay_ms: 2000,
            reconnect_cooldown_ms: 3000,
            queue_capacity: 64,
            simulate: false,
        }
    }
}

impl HardwareConfig {
    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn reconnect_cooldown(&self) -> Duration {
        Duration::from_millis(self.reconnect_cooldown_ms)
    }
}

/// Talking-loop timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnimationConfig {
    /// Absorbs rapid start/stop bursts before the first motion.
    pub jitter_delay_ms: u64,
    /// Cancellable pause after each motion; bounds stop latency.
    pub step_wait_ms: u64,
    pub talk_pattern: Vec<GestureCommand>,
    /// The loop gives up after this many failed sends in a row.
    pub max_consecutive_failures: u32,
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            jitter_delay_ms: 50,
            step_wait_ms: 2000,
            talk_pattern: vec![GestureCommand::Left, GestureCommand::Right, GestureCommand::Nod],
            max_consecutive_failures: 3,
        }
    }
}

impl AnimationConfig {
    pub fn jitter_delay(&self) -> Duration {
        Duration::from_millis(self.jitter_delay_ms)
    }

    pub fn step_wait(&self) -> Duration {
        Duration::from_millis(self.step_wait_ms)
    }
}

impl DuckConfig {
    /// Load from file + environment. A missing file is not an error.
    pub fn load() -> HardwareResult<Self> {
        let path = std::env::var("DEVDUCK_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let builder = config::Config::builder();
        let path = Path::new(&path);
        let builder = if path.exists() {
            builder.add_source(config::File::from(path))
        } else {
            builder
        };

        let built = builder
            .add_source(
                config::Environment::with_prefix("DEVDUCK")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut loaded: DuckConfig = built.try_deserialize()?;
        loaded.apply_port_override(env_opt_string("DUCK_PORT"));
        Ok(loaded)
    }

    /// Parse a TOML document on top of the defaults.
    pub fn from_toml_str(toml: &str) -> HardwareResult<Self> {
        let built = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?;
        Ok(built.try_deserialize()?)
    }

    /// `DUCK_PORT` (or any explicit override) replaces whatever the file said.
    pub fn apply_port_override(&mut self, port: Option<String>) {
        if let Some(port) = port {
            self.hardware.port = Some(port);
        }
    }
}

fn env_opt_string(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_firmware() {
        let config = DuckConfig::default();
        assert_eq!(config.hardware.baud_rate, 9600);
        assert_eq!(config.hardware.port, None);
        assert_eq!(config.hardware.settle_delay(), Duration::from_secs(2));
        assert_eq!(config.hardware.fingerprints.len(), 4);
        assert_eq!(
            config.animation.talk_pattern,
            vec![GestureCommand::Left, GestureCommand::Right, GestureCommand::Nod]
        );
        assert_eq!(config.animation.step_wait(), Duration::from_secs(2));
    }

    #[test]
    fn test_toml_overrides_only_given_keys() {
        let config = DuckConfig::from_toml_str(
            r#"
            [hardware]
            port = "/dev/ttyACM0"
            baud_rate = 115200

            [animation]
            step_wait_ms = 500
            talk_pattern = ["NOD", "SHAKE"]
            "#,
        )
        .unwrap();
        assert_eq!(config.hardware.port.as_deref(), Some("/dev/ttyACM0"));
        assert_eq!(config.hardware.baud_rate, 115200);
        assert_eq!(config.hardware.write_timeout_ms, 1000);
        assert_eq!(config.animation.step_wait_ms, 500);
        assert_eq!(
            config.animation.talk_pattern,
            vec![GestureCommand::Nod, GestureCommand::Shake]
        );
        assert_eq!(config.animation.jitter_delay_ms, 50);
    }

    #[test]
    fn test_port_override_wins() {
        let mut config = DuckConfig::from_toml_str("[hardware]\nport = \"/dev/a\"\n").unwrap();
        config.apply_port_override(None);
        assert_eq!(config.hardware.port.as_deref(), Some("/dev/a"));
        config.apply_port_override(Some("/dev/b".into()));
        assert_eq!(config.hardware.port.as_deref(), Some("/dev/b"));
    }
}
