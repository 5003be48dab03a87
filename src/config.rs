//! Configuration management for the throttle guard.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{GuardError, Result};
use crate::throttle::Policy;

/// Main configuration for a throttle guard.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Default throttling policy
    #[serde(default)]
    pub policy: Policy,

    /// Stale-entry purging configuration
    #[serde(default)]
    pub purge: PurgeConfig,
}

/// Stale-entry purging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeConfig {
    /// Whether to purge automatically in the background
    #[serde(default = "default_purge_enabled")]
    pub enabled: bool,

    /// Purge interval in milliseconds; ten times the cooldown when unset
    #[serde(default)]
    pub interval_ms: Option<u64>,
}

impl Default for PurgeConfig {
    fn default() -> Self {
        Self {
            enabled: default_purge_enabled(),
            interval_ms: None,
        }
    }
}

fn default_purge_enabled() -> bool {
    true
}

impl PurgeConfig {
    /// Configured interval, if any.
    pub fn interval(&self) -> Option<Duration> {
        self.interval_ms.map(Duration::from_millis)
    }
}

impl GuardConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading guard configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GuardConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GuardError::Config(format!("Failed to parse guard config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check the policy and purge settings.
    pub fn validate(&self) -> Result<()> {
        self.policy.validate()?;
        if self.purge.interval_ms == Some(0) {
            return Err(GuardError::Config(
                "purge.interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}
