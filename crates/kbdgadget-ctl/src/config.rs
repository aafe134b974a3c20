//! TOML-based configuration for the gadget controller.
//!
//! The controller usually runs headless on the gadget board itself, so
//! the config file path is an explicit argument (defaulting to
//! `/etc/kbdgadget/config.toml`) rather than a per-user XDG lookup.
//! Example:
//!
//! ```toml
//! [device]
//! path = "/dev/hidg0"
//!
//! [keyboard]
//! keymap_dir = "/etc/kbdgadget/keymaps"
//! active_map = "US"
//! key_delay_ms = 0
//! key_delay_jitter_ms = 0
//! ```
//!
//! Fields annotated with `#[serde(default = "...")]` fall back to their
//! defaults when absent, so a partial or missing file still yields a
//! working configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default location of the controller config file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/kbdgadget/config.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level controller configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ControllerConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub keyboard: KeyboardConfig,
    #[serde(default)]
    pub log: LogConfig,
}

/// USB gadget device settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    /// Character device node of the keyboard gadget function.
    #[serde(default = "default_device_path")]
    pub path: PathBuf,
}

/// Typing behaviour settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct KeyboardConfig {
    /// Directory scanned for `*.json` language map files at startup.
    #[serde(default = "default_keymap_dir")]
    pub keymap_dir: PathBuf,
    /// Name of the language map to activate at startup. When absent,
    /// the first loaded map stays active.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_map: Option<String>,
    /// Base pause between consecutive reports, in milliseconds.
    #[serde(default)]
    pub key_delay_ms: u64,
    /// Upper bound of the additional random pause, in milliseconds.
    #[serde(default)]
    pub key_delay_jitter_ms: u64,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogConfig {
    /// `tracing` log level: `"error"`, `"warn"`, `"info"`, `"debug"`, `"trace"`.
    #[serde(default = "default_log_level")]
    pub level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_device_path() -> PathBuf {
    PathBuf::from("/dev/hidg0")
}
fn default_keymap_dir() -> PathBuf {
    PathBuf::from("/etc/kbdgadget/keymaps")
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: default_device_path(),
        }
    }
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            keymap_dir: default_keymap_dir(),
            active_map: None,
            key_delay_ms: 0,
            key_delay_jitter_ms: 0,
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ── Load / save ───────────────────────────────────────────────────────────────

/// Loads the configuration from `path`, returning
/// `ControllerConfig::default()` if the file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than
/// "not found", and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<ControllerConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => {
            let cfg: ControllerConfig = toml::from_str(&content)?;
            Ok(cfg)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ControllerConfig::default()),
        Err(e) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}

/// Persists `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &ControllerConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_default_config_points_at_hidg0() {
        // Arrange / Act
        let cfg = ControllerConfig::default();

        // Assert
        assert_eq!(cfg.device.path, PathBuf::from("/dev/hidg0"));
        assert_eq!(cfg.keyboard.key_delay_ms, 0);
        assert_eq!(cfg.keyboard.key_delay_jitter_ms, 0);
        assert_eq!(cfg.keyboard.active_map, None);
        assert_eq!(cfg.log.level, "info");
    }

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: ControllerConfig = toml::from_str("").expect("deserialize empty");
        assert_eq!(cfg, ControllerConfig::default());
    }

    #[test]
    fn test_deserialize_partial_toml_overrides_only_named_fields() {
        // Arrange
        let toml_str = r#"
[keyboard]
key_delay_ms = 25
active_map = "DE"
"#;

        // Act
        let cfg: ControllerConfig = toml::from_str(toml_str).expect("deserialize partial");

        // Assert
        assert_eq!(cfg.keyboard.key_delay_ms, 25);
        assert_eq!(cfg.keyboard.active_map.as_deref(), Some("DE"));
        // Unspecified fields keep their defaults
        assert_eq!(cfg.keyboard.key_delay_jitter_ms, 0);
        assert_eq!(cfg.device.path, PathBuf::from("/dev/hidg0"));
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<ControllerConfig, toml::de::Error> = toml::from_str("[[[ not toml");
        assert!(result.is_err());
    }

    // ── Round-trip ────────────────────────────────────────────────────────────

    #[test]
    fn test_config_serializes_and_deserializes_round_trip() {
        // Arrange
        let mut cfg = ControllerConfig::default();
        cfg.device.path = PathBuf::from("/dev/hidg1");
        cfg.keyboard.key_delay_jitter_ms = 10;
        cfg.keyboard.active_map = Some("US".to_string());
        cfg.log.level = "debug".to_string();

        // Act
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: ControllerConfig = toml::from_str(&toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg, restored);
    }

    #[test]
    fn test_none_active_map_is_omitted_from_toml() {
        let cfg = ControllerConfig::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        assert!(!toml_str.contains("active_map"), "None active_map must be omitted");
    }

    // ── load / save ───────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("missing.toml")).unwrap();
        assert_eq!(cfg, ControllerConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = ControllerConfig::default();
        cfg.keyboard.key_delay_ms = 5;
        cfg.log.level = "trace".to_string();

        // Act
        save_config(&cfg, &path).unwrap();
        let loaded = load_config(&path).unwrap();

        // Assert
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn test_load_config_with_malformed_file_returns_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "device = \"not a table\"").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }
}
