//! Configuration loading from environment variables and TOML files.
//!
//! All configuration values are loaded from `ARB_*` environment variables
//! with sensible defaults. Invalid values fall back to defaults without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `ARB_BUFFER_TIMEOUT_MS` | 1000 | Batch timeout (ms), 0 disables |
//! | `ARB_TIMEOUT_CHECK_INTERVAL_MS` | 100 | Shared ticker period (ms) |
//! | `ARB_BATCH_SIZE` | 1000 | Active queue size that triggers a flush |
//! | `ARB_LOG_LEVEL` | info | Tracing filter directive |
//! | `ARB_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::buffer::BufferConfig;
use crate::controller::ControllerConfig;
use crate::error::ConfigError;
use crate::telemetry::{LogConfig, LogFormat};

const DEFAULT_BUFFER_TIMEOUT_MS: u64 = 1000;
const DEFAULT_CHECK_INTERVAL_MS: u64 = 100;
const DEFAULT_BATCH_SIZE: usize = 1000;

/// Effective configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub buffer_timeout_ms: u64,
    pub timeout_check_interval_ms: u64,
    pub batch_size: usize,
    pub log_level: String,
    pub log_format: String,
}

/// All configuration loaded from the environment or a file.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub controller: ControllerConfig,
    pub log: LogConfig,
}

/// On-disk form of the configuration. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    buffer_timeout_ms: Option<u64>,
    timeout_check_interval_ms: Option<u64>,
    batch_size: Option<usize>,
    log_level: Option<String>,
    log_format: Option<String>,
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<usize>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Parse a `u64` env var, returning `default` on missing or invalid.
fn parse_u64(key: &str, default: u64) -> u64 {
    match std::env::var(key) {
        Ok(val) => val.trim().parse::<u64>().unwrap_or(default),
        Err(_) => default,
    }
}

/// Clamp raw values into a valid controller config.
fn controller_config(timeout_ms: u64, interval_ms: u64, batch_size: usize) -> ControllerConfig {
    let interval_ms = interval_ms.max(1); // floor: 1ms
    let batch_size = batch_size.max(1);
    ControllerConfig {
        buffer: BufferConfig {
            buffer_timeout: Duration::from_millis(timeout_ms),
            check_interval: Duration::from_millis(interval_ms),
        },
        batch_size,
    }
}

/// Load logging configuration from environment.
fn load_log_config() -> LogConfig {
    let level = std::env::var("ARB_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
    let format = std::env::var("ARB_LOG_FORMAT")
        .ok()
        .and_then(|v| v.parse::<LogFormat>().ok())
        .unwrap_or_default();
    LogConfig { format, level, output_path: None }
}

/// Load all configuration from environment variables.
///
/// Missing or invalid values fall back to safe defaults without panicking.
pub fn load() -> EnvConfig {
    let timeout_ms = parse_u64("ARB_BUFFER_TIMEOUT_MS", DEFAULT_BUFFER_TIMEOUT_MS);
    let interval_ms = parse_u64("ARB_TIMEOUT_CHECK_INTERVAL_MS", DEFAULT_CHECK_INTERVAL_MS);
    let batch_size = parse_usize("ARB_BATCH_SIZE", DEFAULT_BATCH_SIZE);

    EnvConfig {
        controller: controller_config(timeout_ms, interval_ms, batch_size),
        log: load_log_config(),
    }
}

/// Parse configuration from a TOML document.
///
/// Unlike [`load`], malformed input is an error and no floors are applied:
/// a zero `batch_size`, or a zero `timeout_check_interval_ms` while the timeout
/// is enabled, is rejected. Omitted keys take defaults.
pub fn from_toml_str(input: &str) -> Result<EnvConfig, ConfigError> {
    let file: FileConfig = toml::from_str(input)?;

    let format = match file.log_format.as_deref() {
        Some(raw) => raw
            .parse::<LogFormat>()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?,
        None => LogFormat::default(),
    };
    if file.batch_size == Some(0) {
        return Err(ConfigError::Invalid("batch_size must be at least 1".to_string()));
    }
    let timeout_ms = file.buffer_timeout_ms.unwrap_or(DEFAULT_BUFFER_TIMEOUT_MS);
    let interval_ms = file.timeout_check_interval_ms.unwrap_or(DEFAULT_CHECK_INTERVAL_MS);
    if timeout_ms > 0 && interval_ms == 0 {
        return Err(ConfigError::Invalid(
            "timeout_check_interval_ms must be at least 1 when buffer_timeout_ms is set".to_string(),
        ));
    }

    Ok(EnvConfig {
        controller: controller_config(
            timeout_ms,
            interval_ms,
            file.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
        ),
        log: LogConfig {
            format,
            level: file.log_level.unwrap_or_else(|| "info".to_string()),
            output_path: None,
        },
    })
}

/// Read and parse a TOML configuration file.
pub fn from_file(path: impl AsRef<Path>) -> Result<EnvConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    from_toml_str(&contents)
}

impl EnvConfig {
    /// Return a serializable summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            buffer_timeout_ms: self.controller.buffer.buffer_timeout.as_millis() as u64,
            timeout_check_interval_ms: self.controller.buffer.check_interval.as_millis() as u64,
            batch_size: self.controller.batch_size,
            log_level: self.log.level.clone(),
            log_format: self.log.format.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Serialize env-mutating tests to avoid cross-test pollution.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ENV_KEYS: &[&str] = &[
        "ARB_BUFFER_TIMEOUT_MS",
        "ARB_TIMEOUT_CHECK_INTERVAL_MS",
        "ARB_BATCH_SIZE",
        "ARB_LOG_LEVEL",
        "ARB_LOG_FORMAT",
    ];

    fn clear_env_vars() {
        for k in ENV_KEYS {
            std::env::remove_var(k);
        }
    }

    #[test]
    fn test_defaults_are_sensible() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let cfg = load();
        assert_eq!(cfg.controller.buffer.buffer_timeout, Duration::from_millis(1000));
        assert_eq!(cfg.controller.buffer.check_interval, Duration::from_millis(100));
        assert_eq!(cfg.controller.batch_size, 1000);
        assert_eq!(cfg.log.level, "info");
        assert_eq!(cfg.log.format, LogFormat::Json);
    }

    #[test]
    fn test_env_vars_override_defaults() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("ARB_BUFFER_TIMEOUT_MS", "50");
        std::env::set_var("ARB_TIMEOUT_CHECK_INTERVAL_MS", "10");
        std::env::set_var("ARB_BATCH_SIZE", "64");
        std::env::set_var("ARB_LOG_FORMAT", "pretty");
        let cfg = load();
        assert_eq!(cfg.controller.buffer.buffer_timeout, Duration::from_millis(50));
        assert_eq!(cfg.controller.buffer.check_interval, Duration::from_millis(10));
        assert_eq!(cfg.controller.batch_size, 64);
        assert_eq!(cfg.log.format, LogFormat::Pretty);
        clear_env_vars();
    }

    #[test]
    fn test_invalid_env_falls_back_to_default() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("ARB_BUFFER_TIMEOUT_MS", "soon");
        std::env::set_var("ARB_BATCH_SIZE", "-3");
        std::env::set_var("ARB_LOG_FORMAT", "xml");
        let cfg = load();
        assert_eq!(cfg.controller.buffer.buffer_timeout, Duration::from_millis(1000));
        assert_eq!(cfg.controller.batch_size, 1000);
        assert_eq!(cfg.log.format, LogFormat::Json);
        clear_env_vars();
    }

    #[test]
    fn test_floors_applied() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("ARB_TIMEOUT_CHECK_INTERVAL_MS", "0");
        std::env::set_var("ARB_BATCH_SIZE", "0");
        let cfg = load();
        assert_eq!(cfg.controller.buffer.check_interval, Duration::from_millis(1));
        assert_eq!(cfg.controller.batch_size, 1);
        assert!(cfg.controller.buffer.validate().is_ok());
        clear_env_vars();
    }

    #[test]
    fn test_zero_timeout_disables() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        std::env::set_var("ARB_BUFFER_TIMEOUT_MS", "0");
        let cfg = load();
        assert!(!cfg.controller.buffer.timeout_enabled());
        clear_env_vars();
    }

    #[test]
    fn test_effective_config_serializes() {
        let _lock = ENV_LOCK.lock().unwrap();
        clear_env_vars();
        let eff = load().effective_config();
        let json = serde_json::to_value(&eff).unwrap();
        assert_eq!(json["buffer_timeout_ms"], 1000);
        assert_eq!(json["timeout_check_interval_ms"], 100);
        assert_eq!(json["batch_size"], 1000);
        assert_eq!(json["log_format"], "json");
    }
}
