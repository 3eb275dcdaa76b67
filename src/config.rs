//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::error::{MinidroneError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub piloting: PilotingConfig,

    #[serde(default)]
    pub operations: OperationsConfig,

    #[serde(default)]
    pub link: LinkConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Piloting loop and setup commands sent after the handshake
#[derive(Debug, Deserialize, Clone)]
pub struct PilotingConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_stop_delay_ticks")]
    pub stop_delay_ticks: u32,

    /// Degrees
    #[serde(default = "default_max_tilt")]
    pub max_tilt: f32,

    /// m/s
    #[serde(default = "default_max_vertical_speed")]
    pub max_vertical_speed: f32,

    /// deg/s
    #[serde(default = "default_max_rotation_speed")]
    pub max_rotation_speed: f32,

    #[serde(default = "default_cutout_mode")]
    pub cutout_mode: bool,
}

/// Operation completion delays and preconditions
#[derive(Debug, Deserialize, Clone)]
pub struct OperationsConfig {
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    #[serde(default = "default_turn_delay_ms")]
    pub turn_delay_ms: u64,

    #[serde(default = "default_flip_delay_ms")]
    pub flip_delay_ms: u64,

    #[serde(default = "default_flip_min_battery")]
    pub flip_min_battery: u8,

    #[serde(default = "default_speed")]
    pub default_speed: u8,
}

/// Link lifecycle timing
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    #[serde(default = "default_connect_delay_ms")]
    pub connect_delay_ms: u64,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_command_buffer_size")]
    pub command_buffer_size: usize,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for daily log files, empty for stdout only
    #[serde(default)]
    pub dir: String,
}

// Default value functions
fn default_tick_ms() -> u64 { 100 }
fn default_stop_delay_ticks() -> u32 { 5 }
fn default_max_tilt() -> f32 { 15.0 }
fn default_max_vertical_speed() -> f32 { 2.0 }
fn default_max_rotation_speed() -> f32 { 90.0 }
fn default_cutout_mode() -> bool { true }

fn default_settle_delay_ms() -> u64 { 1000 }
fn default_turn_delay_ms() -> u64 { 2000 }
fn default_flip_delay_ms() -> u64 { 3000 }
fn default_flip_min_battery() -> u8 { 10 }
fn default_speed() -> u8 { 50 }

fn default_connect_delay_ms() -> u64 { 1000 }
fn default_connect_timeout_ms() -> u64 { 30000 }
fn default_command_buffer_size() -> usize { 32 }

impl Default for PilotingConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            stop_delay_ticks: default_stop_delay_ticks(),
            max_tilt: default_max_tilt(),
            max_vertical_speed: default_max_vertical_speed(),
            max_rotation_speed: default_max_rotation_speed(),
            cutout_mode: default_cutout_mode(),
        }
    }
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: default_settle_delay_ms(),
            turn_delay_ms: default_turn_delay_ms(),
            flip_delay_ms: default_flip_delay_ms(),
            flip_min_battery: default_flip_min_battery(),
            default_speed: default_speed(),
        }
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            connect_delay_ms: default_connect_delay_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            command_buffer_size: default_command_buffer_size(),
        }
    }
}

impl PilotingConfig {
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl LinkConfig {
    pub fn connect_delay(&self) -> Duration {
        Duration::from_millis(self.connect_delay_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

fn invalid(message: impl std::fmt::Display) -> MinidroneError {
    MinidroneError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use minidrone::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        let p = &self.piloting;

        if p.tick_ms == 0 || p.tick_ms > 1000 {
            return Err(invalid("tick_ms must be between 1 and 1000"));
        }

        if p.stop_delay_ticks > 50 {
            return Err(invalid("stop_delay_ticks must be between 0 and 50"));
        }

        if !(5.0..=25.0).contains(&p.max_tilt) {
            return Err(invalid("max_tilt must be between 5.0 and 25.0"));
        }

        if !(0.5..=2.0).contains(&p.max_vertical_speed) {
            return Err(invalid("max_vertical_speed must be between 0.5 and 2.0"));
        }

        if !(50.0..=360.0).contains(&p.max_rotation_speed) {
            return Err(invalid("max_rotation_speed must be between 50.0 and 360.0"));
        }

        let o = &self.operations;

        if o.settle_delay_ms > 10000 {
            return Err(invalid("settle_delay_ms must be between 0 and 10000"));
        }

        for (name, value) in [
            ("turn_delay_ms", o.turn_delay_ms),
            ("flip_delay_ms", o.flip_delay_ms),
        ] {
            if value == 0 || value > 10000 {
                return Err(invalid(format!("{} must be between 1 and 10000", name)));
            }
        }

        if o.flip_min_battery > 100 {
            return Err(invalid("flip_min_battery must be between 0 and 100"));
        }

        if o.default_speed > 100 {
            return Err(invalid("default_speed must be between 0 and 100"));
        }

        let l = &self.link;

        if l.connect_delay_ms > 10000 {
            return Err(invalid("connect_delay_ms must be between 0 and 10000"));
        }

        if l.connect_timeout_ms == 0 || l.connect_timeout_ms > 600_000 {
            return Err(invalid("connect_timeout_ms must be between 1 and 600000"));
        }

        if l.command_buffer_size == 0 || l.command_buffer_size > 1024 {
            return Err(invalid("command_buffer_size must be between 1 and 1024"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_default_config() {
        let config = create_valid_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.piloting.tick(), Duration::from_millis(100));
        assert_eq!(config.piloting.stop_delay_ticks, 5);
        assert_eq!(config.operations.flip_min_battery, 10);
        assert_eq!(config.operations.default_speed, 50);
        assert_eq!(config.link.connect_delay(), Duration::from_secs(1));
        assert!(config.logging.dir.is_empty());
    }

    #[test]
    fn test_invalid_tick() {
        let mut config = create_valid_config();
        config.piloting.tick_ms = 0;
        assert!(config.validate().is_err());

        config.piloting.tick_ms = 1001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_max_tilt() {
        let mut config = create_valid_config();
        config.piloting.max_tilt = 30.0;
        assert!(config.validate().is_err());

        config.piloting.max_tilt = 4.9;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_speed_limits_boundaries() {
        let mut config = create_valid_config();
        config.piloting.max_vertical_speed = 0.5;
        config.piloting.max_rotation_speed = 360.0;
        assert!(config.validate().is_ok());

        config.piloting.max_vertical_speed = 2.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_operation_delays() {
        let mut config = create_valid_config();
        config.operations.turn_delay_ms = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.operations.flip_delay_ms = 20000;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.operations.settle_delay_ms = 0;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_percentages() {
        let mut config = create_valid_config();
        config.operations.flip_min_battery = 101;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.operations.default_speed = 150;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_link_settings() {
        let mut config = create_valid_config();
        config.link.connect_timeout_ms = 0;
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.link.command_buffer_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[piloting]
tick_ms = 50
max_tilt = 20.0

[operations]
default_speed = 80

[link]
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.piloting.tick_ms, 50);
        assert_eq!(config.piloting.max_tilt, 20.0);
        assert_eq!(config.piloting.stop_delay_ticks, 5);
        assert_eq!(config.operations.default_speed, 80);
        assert_eq!(config.link.connect_timeout_ms, 30000);
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        use tempfile::NamedTempFile;

        let temp_file = NamedTempFile::new().unwrap();
        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.piloting.tick_ms, 100);
        assert_eq!(config.operations.flip_delay_ms, 3000);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(temp_file, "[operations]\nflip_min_battery = 200").unwrap();
        temp_file.flush().unwrap();

        let result = Config::load(temp_file.path());
        assert!(matches!(result, Err(MinidroneError::Config(_))));
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        let defaults = Config::default();

        assert_eq!(config.piloting.tick_ms, defaults.piloting.tick_ms);
        assert_eq!(config.piloting.max_tilt, defaults.piloting.max_tilt);
        assert_eq!(config.operations.turn_delay_ms, defaults.operations.turn_delay_ms);
        assert_eq!(config.link.connect_timeout_ms, defaults.link.connect_timeout_ms);
        assert_eq!(config.logging.dir, defaults.logging.dir);
    }

    #[test]
    fn test_load_missing_file() {
        let result = Config::load("/nonexistent/minidrone.toml");
        assert!(matches!(result, Err(MinidroneError::Io(_))));
    }
}
