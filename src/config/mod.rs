use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::pool::PoolError;

/// Retry behavior attached to connections by the factory.
///
/// These toggles shape what the caller-supplied factory does when dialing;
/// the pool itself never retries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryOptions {
    /// Enable per-call retries on the underlying connection
    #[serde(default)]
    pub enabled: bool,

    /// Maximum retry attempts per call
    #[serde(default = "default_retry_attempts")]
    pub attempts: u32,

    /// Backoff interval between attempts in seconds
    #[serde(default = "default_retry_timeout")]
    pub timeout_secs: u64,
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_timeout() -> u64 {
    30
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            attempts: default_retry_attempts(),
            timeout_secs: default_retry_timeout(),
        }
    }
}

/// Pool sizing and timeout configuration
///
/// Immutable after validation; the target list it seeds the registry with may
/// be hot-swapped later through the pool's update channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Service name, used by factory-level tracing
    #[serde(default)]
    pub service_name: String,

    /// Initial list of dialable target addresses
    pub initial_targets: Vec<String>,

    /// Connections pre-created at construction
    #[serde(default = "default_initial_capacity")]
    pub initial_capacity: usize,

    /// Upper bound on idle connections retained by the pool
    #[serde(default = "default_max_capacity")]
    pub max_capacity: usize,

    /// Dial timeout in seconds, enforced by the factory
    #[serde(default = "default_io_timeout")]
    pub dial_timeout_secs: u64,

    /// Maximum idle time before a pooled connection is evicted.
    /// Zero disables eviction entirely.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    /// Read timeout in seconds, enforced by the factory
    #[serde(default = "default_io_timeout")]
    pub read_timeout_secs: u64,

    /// Write timeout in seconds, enforced by the factory
    #[serde(default = "default_io_timeout")]
    pub write_timeout_secs: u64,

    /// Per-call retry toggles consumed by the factory
    #[serde(default)]
    pub retry: RetryOptions,

    /// Attach distributed tracing to new connections
    #[serde(default)]
    pub tracing_enabled: bool,

    /// Attach call metrics to new connections
    #[serde(default)]
    pub metrics_enabled: bool,
}

fn default_initial_capacity() -> usize {
    5
}

fn default_max_capacity() -> usize {
    100
}

fn default_io_timeout() -> u64 {
    5
}

fn default_idle_timeout() -> u64 {
    60
}

impl PoolOptions {
    /// Create options with sane defaults for the given service and targets.
    ///
    /// An `initial_capacity` of zero falls back to 5; a `max_capacity` of 5 or
    /// less falls back to 100.
    pub fn new(
        service_name: impl Into<String>,
        initial_targets: Vec<String>,
        initial_capacity: usize,
        max_capacity: usize,
    ) -> Self {
        let initial_capacity = if initial_capacity == 0 {
            default_initial_capacity()
        } else {
            initial_capacity
        };
        let max_capacity = if max_capacity <= 5 {
            default_max_capacity()
        } else {
            max_capacity
        };

        Self {
            service_name: service_name.into(),
            initial_targets,
            initial_capacity,
            max_capacity,
            dial_timeout_secs: default_io_timeout(),
            idle_timeout_secs: default_idle_timeout(),
            read_timeout_secs: default_io_timeout(),
            write_timeout_secs: default_io_timeout(),
            retry: RetryOptions::default(),
            tracing_enabled: false,
            metrics_enabled: false,
        }
    }

    /// Check sizing and timeout constraints.
    ///
    /// `idle_timeout_secs == 0` is deliberately allowed: it disables idle
    /// eviction rather than being a configuration error.
    pub fn validate(&self) -> Result<(), PoolError> {
        if self.initial_targets.is_empty() {
            return Err(PoolError::InvalidConfiguration(
                "initial_targets must not be empty".to_string(),
            ));
        }
        if self.initial_capacity == 0 {
            return Err(PoolError::InvalidConfiguration(
                "initial_capacity must be greater than zero".to_string(),
            ));
        }
        if self.initial_capacity > self.max_capacity {
            return Err(PoolError::InvalidConfiguration(format!(
                "initial_capacity {} exceeds max_capacity {}",
                self.initial_capacity, self.max_capacity
            )));
        }
        if self.dial_timeout_secs == 0 {
            return Err(PoolError::InvalidConfiguration(
                "dial_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.read_timeout_secs == 0 {
            return Err(PoolError::InvalidConfiguration(
                "read_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.write_timeout_secs == 0 {
            return Err(PoolError::InvalidConfiguration(
                "write_timeout_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }

    /// Override factory toggles from the environment.
    ///
    /// `RPCPOOL_RETRY`, `RPCPOOL_TRACING` and `RPCPOOL_METRICS` accept
    /// on/off/true/false; `RPCPOOL_RETRY_ATTEMPTS` and
    /// `RPCPOOL_RETRY_TIMEOUT` fill the retry knobs when parseable.
    pub fn apply_env_overrides(&mut self) {
        if let Some(enabled) = env_toggle("RPCPOOL_RETRY") {
            self.retry.enabled = enabled;
        }
        if let Some(enabled) = env_toggle("RPCPOOL_TRACING") {
            self.tracing_enabled = enabled;
        }
        if let Some(enabled) = env_toggle("RPCPOOL_METRICS") {
            self.metrics_enabled = enabled;
        }

        if let Ok(attempts) = std::env::var("RPCPOOL_RETRY_ATTEMPTS") {
            if let Ok(val) = attempts.parse() {
                self.retry.attempts = val;
            }
        }
        if let Ok(timeout) = std::env::var("RPCPOOL_RETRY_TIMEOUT") {
            if let Ok(val) = timeout.parse() {
                self.retry.timeout_secs = val;
            }
        }
    }
}

/// Parse an on/off/true/false environment toggle
fn env_toggle(key: &str) -> Option<bool> {
    match std::env::var(key).ok()?.to_lowercase().as_str() {
        "on" | "true" => Some(true),
        "off" | "false" => Some(false),
        _ => None,
    }
}

/// Load pool options from a YAML file
pub fn load_from_yaml<P: AsRef<Path>>(path: P) -> Result<PoolOptions> {
    let content = std::fs::read_to_string(path.as_ref())
        .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

    let options: PoolOptions =
        serde_yaml::from_str(&content).context("Failed to parse YAML configuration")?;

    Ok(options)
}

/// Load pool options from environment variables
///
/// Recognized variables:
/// - `RPCPOOL_TARGETS` (required, comma-separated list of addresses)
/// - `RPCPOOL_SERVICE_NAME`
/// - `RPCPOOL_INITIAL_CAPACITY` / `RPCPOOL_MAX_CAPACITY`
/// - `RPCPOOL_DIAL_TIMEOUT` / `RPCPOOL_IDLE_TIMEOUT` /
///   `RPCPOOL_READ_TIMEOUT` / `RPCPOOL_WRITE_TIMEOUT` (seconds)
/// - factory toggles, see [`PoolOptions::apply_env_overrides`]
pub fn load_from_env() -> Result<PoolOptions> {
    // Pick up a .env file when present, ignore when absent
    let _ = dotenvy::dotenv();

    let targets_str =
        std::env::var("RPCPOOL_TARGETS").context("RPCPOOL_TARGETS environment variable not set")?;

    let targets: Vec<String> = targets_str
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if targets.is_empty() {
        anyhow::bail!("RPCPOOL_TARGETS contains no valid targets");
    }

    let service_name = std::env::var("RPCPOOL_SERVICE_NAME").unwrap_or_default();

    let mut options = PoolOptions {
        service_name,
        initial_targets: targets,
        initial_capacity: default_initial_capacity(),
        max_capacity: default_max_capacity(),
        dial_timeout_secs: default_io_timeout(),
        idle_timeout_secs: default_idle_timeout(),
        read_timeout_secs: default_io_timeout(),
        write_timeout_secs: default_io_timeout(),
        retry: RetryOptions::default(),
        tracing_enabled: false,
        metrics_enabled: false,
    };

    if let Ok(val) = std::env::var("RPCPOOL_INITIAL_CAPACITY") {
        if let Ok(parsed) = val.parse() {
            options.initial_capacity = parsed;
        }
    }
    if let Ok(val) = std::env::var("RPCPOOL_MAX_CAPACITY") {
        if let Ok(parsed) = val.parse() {
            options.max_capacity = parsed;
        }
    }
    if let Ok(val) = std::env::var("RPCPOOL_DIAL_TIMEOUT") {
        if let Ok(parsed) = val.parse() {
            options.dial_timeout_secs = parsed;
        }
    }
    if let Ok(val) = std::env::var("RPCPOOL_IDLE_TIMEOUT") {
        if let Ok(parsed) = val.parse() {
            options.idle_timeout_secs = parsed;
        }
    }
    if let Ok(val) = std::env::var("RPCPOOL_READ_TIMEOUT") {
        if let Ok(parsed) = val.parse() {
            options.read_timeout_secs = parsed;
        }
    }
    if let Ok(val) = std::env::var("RPCPOOL_WRITE_TIMEOUT") {
        if let Ok(parsed) = val.parse() {
            options.write_timeout_secs = parsed;
        }
    }

    options.apply_env_overrides();

    Ok(options)
}

/// Load pool options from a file or fall back to the environment
pub fn load_options(config_path: Option<&str>) -> Result<PoolOptions> {
    if let Some(path) = config_path {
        load_from_yaml(path)
    } else {
        load_from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_from_yaml_str() {
        let yaml = r#"
service_name: order-service
initial_targets:
  - 127.0.0.1:6066
  - 127.0.0.1:6067
initial_capacity: 5
max_capacity: 10
idle_timeout_secs: 30

retry:
  enabled: true
  attempts: 5
"#;

        let options: PoolOptions = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(options.service_name, "order-service");
        assert_eq!(options.initial_targets.len(), 2);
        assert_eq!(options.initial_capacity, 5);
        assert_eq!(options.max_capacity, 10);
        assert_eq!(options.idle_timeout_secs, 30);
        assert!(options.retry.enabled);
        assert_eq!(options.retry.attempts, 5);
        // Unset retry timeout falls back to its default
        assert_eq!(options.retry.timeout_secs, 30);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_default_values() {
        let yaml = r#"
initial_targets:
  - 127.0.0.1:6066
"#;

        let options: PoolOptions = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(options.initial_capacity, 5);
        assert_eq!(options.max_capacity, 100);
        assert_eq!(options.dial_timeout_secs, 5);
        assert_eq!(options.idle_timeout_secs, 60);
        assert_eq!(options.read_timeout_secs, 5);
        assert_eq!(options.write_timeout_secs, 5);
        assert!(!options.retry.enabled);
        assert!(!options.tracing_enabled);
        assert!(!options.metrics_enabled);
    }

    #[test]
    fn test_new_clamps_capacities() {
        let options = PoolOptions::new("svc", vec!["t1".to_string()], 0, 3);
        assert_eq!(options.initial_capacity, 5);
        assert_eq!(options.max_capacity, 100);

        let options = PoolOptions::new("svc", vec!["t1".to_string()], 2, 8);
        assert_eq!(options.initial_capacity, 2);
        assert_eq!(options.max_capacity, 8);
    }

    #[test]
    fn test_validate_rejects_empty_targets() {
        let options = PoolOptions::new("svc", vec![], 2, 8);
        assert!(matches!(
            options.validate(),
            Err(PoolError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_initial_capacity() {
        let mut options = PoolOptions::new("svc", vec!["t1".to_string()], 2, 8);
        options.initial_capacity = 0;
        assert!(matches!(
            options.validate(),
            Err(PoolError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_initial_above_max() {
        let mut options = PoolOptions::new("svc", vec!["t1".to_string()], 2, 8);
        options.initial_capacity = 9;
        assert!(matches!(
            options.validate(),
            Err(PoolError::InvalidConfiguration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        for field in ["dial", "read", "write"] {
            let mut options = PoolOptions::new("svc", vec!["t1".to_string()], 2, 8);
            match field {
                "dial" => options.dial_timeout_secs = 0,
                "read" => options.read_timeout_secs = 0,
                _ => options.write_timeout_secs = 0,
            }
            assert!(
                matches!(options.validate(), Err(PoolError::InvalidConfiguration(_))),
                "{} timeout of zero should be rejected",
                field
            );
        }
    }

    #[test]
    fn test_zero_idle_timeout_is_valid() {
        let mut options = PoolOptions::new("svc", vec!["t1".to_string()], 2, 8);
        options.idle_timeout_secs = 0;
        assert!(options.validate().is_ok());
    }
}
