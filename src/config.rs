//! Connection manager configuration.
//!
//! [`ManagerConfig`] carries everything the manager used to take from
//! compiled-in constants: the broker's destination identifier, the timeout
//! applied when a caller does not pick one, the idle linger of bindings and
//! the in-flight command cap.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use pmp_ipc::ManagerConfig;
//!
//! let config = ManagerConfig::from_json(r#"{ "linger_ms": 0, "max_in_flight": 8 }"#).unwrap();
//! assert_eq!(config.linger, Duration::ZERO);
//! assert_eq!(config.max_in_flight, 8);
//! ```

use std::time::Duration;

use serde::Deserialize;

use crate::error::{PmpError, Result};

/// Destination identifier of the broker service.
pub const DEFAULT_PMP_IDENTIFIER: &str = "de.unistuttgart.ipvs.pmp.service.PMPService";

/// Timeout used when the caller does not pass one.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

/// How long an idle binding is kept before it is unbound.
pub const DEFAULT_LINGER: Duration = Duration::from_secs(30);

/// Default maximum number of commands executing at once.
pub const DEFAULT_MAX_IN_FLIGHT: usize = 256;

/// Configuration for the [`ConnectionManager`](crate::ConnectionManager).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    /// Destination identifier commands targeting the broker are sent to.
    pub pmp_identifier: String,
    /// Timeout applied by the client API when none is given.
    pub default_timeout: Duration,
    /// Idle time after which a binding is torn down. Zero unbinds immediately.
    pub linger: Duration,
    /// Maximum commands executing concurrently; excess commands wait.
    pub max_in_flight: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            pmp_identifier: DEFAULT_PMP_IDENTIFIER.to_string(),
            default_timeout: DEFAULT_COMMAND_TIMEOUT,
            linger: DEFAULT_LINGER,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

impl ManagerConfig {
    /// Create a configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the broker's destination identifier.
    pub fn with_pmp_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.pmp_identifier = identifier.into();
        self
    }

    /// Set the timeout used when callers do not pass one.
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Set the idle linger of bindings.
    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// Set the in-flight command cap.
    pub fn with_max_in_flight(mut self, limit: usize) -> Self {
        self.max_in_flight = limit;
        self
    }

    /// Check the configuration for values the manager cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.pmp_identifier.is_empty() {
            return Err(PmpError::InvalidConfiguration(
                "pmp_identifier must not be empty".to_string(),
            ));
        }
        if self.default_timeout.is_zero() {
            return Err(PmpError::InvalidConfiguration(
                "default_timeout must be positive".to_string(),
            ));
        }
        if self.max_in_flight == 0 {
            return Err(PmpError::InvalidConfiguration(
                "max_in_flight must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration document.
    ///
    /// Durations are given in milliseconds; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ConfigFile = serde_json::from_str(json)?;
        let config = Self::from(file);
        config.validate()?;
        Ok(config)
    }
}

/// On-disk shape of [`ManagerConfig`].
#[derive(Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    pmp_identifier: String,
    default_timeout_ms: u64,
    linger_ms: u64,
    max_in_flight: usize,
}

impl Default for ConfigFile {
    fn default() -> Self {
        let defaults = ManagerConfig::default();
        Self {
            pmp_identifier: defaults.pmp_identifier,
            default_timeout_ms: defaults.default_timeout.as_millis() as u64,
            linger_ms: defaults.linger.as_millis() as u64,
            max_in_flight: defaults.max_in_flight,
        }
    }
}

impl From<ConfigFile> for ManagerConfig {
    fn from(file: ConfigFile) -> Self {
        Self {
            pmp_identifier: file.pmp_identifier,
            default_timeout: Duration::from_millis(file.default_timeout_ms),
            linger: Duration::from_millis(file.linger_ms),
            max_in_flight: file.max_in_flight,
        }
    }
}
