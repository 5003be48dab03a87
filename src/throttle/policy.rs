//! Throttling policy and per-call overrides.

use serde::{Deserialize, Serialize};

use crate::error::{GuardError, Result};

/// Default number of consecutive requests allowed before throttling.
pub const DEFAULT_MAX_REQUESTS: u32 = 3;
/// Default maximum gap between two requests of the same streak.
pub const DEFAULT_WINDOW_MS: u64 = 3_000;
/// Default cooldown after the limit is reached.
pub const DEFAULT_COOLDOWN_MS: u64 = 15_000;
/// Default namespace mixed into every stored key.
pub const DEFAULT_NAMESPACE: &str = "default-ip-attempts";

/// Parameters for one throttling evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Requests allowed in a streak before callers are rejected
    #[serde(default = "default_max_requests")]
    pub max_requests: u32,

    /// Largest gap (ms) between requests that still continues a streak
    #[serde(default = "default_window_ms")]
    pub window_ms: u64,

    /// How long (ms) a throttled caller waits before its streak resets
    #[serde(default = "default_cooldown_ms")]
    pub cooldown_ms: u64,

    /// Prefix separating independent limiters that share one ledger
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            max_requests: default_max_requests(),
            window_ms: default_window_ms(),
            cooldown_ms: default_cooldown_ms(),
            namespace: default_namespace(),
        }
    }
}

fn default_max_requests() -> u32 {
    DEFAULT_MAX_REQUESTS
}

fn default_window_ms() -> u64 {
    DEFAULT_WINDOW_MS
}

fn default_cooldown_ms() -> u64 {
    DEFAULT_COOLDOWN_MS
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

impl Policy {
    /// Check that every threshold and duration is positive.
    pub fn validate(&self) -> Result<()> {
        if self.max_requests == 0 {
            return Err(GuardError::Config(
                "max_requests must be greater than zero".to_string(),
            ));
        }
        if self.window_ms == 0 {
            return Err(GuardError::Config(
                "window_ms must be greater than zero".to_string(),
            ));
        }
        if self.cooldown_ms == 0 {
            return Err(GuardError::Config(
                "cooldown_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Overlay `overrides` on top of this policy, rightmost wins.
    ///
    /// Values are taken as given; call [`Policy::validate`] on the result
    /// before trusting it.
    pub fn overlaid(&self, overrides: &PolicyOverrides) -> Policy {
        Policy {
            max_requests: overrides.max_requests.unwrap_or(self.max_requests),
            window_ms: overrides.window_ms.unwrap_or(self.window_ms),
            cooldown_ms: overrides.cooldown_ms.unwrap_or(self.cooldown_ms),
            namespace: overrides
                .namespace
                .clone()
                .unwrap_or_else(|| self.namespace.clone()),
        }
    }

    /// Like [`Policy::overlaid`], but zero-valued numeric overrides are
    /// treated as unset so the merged policy stays usable for evaluation.
    pub fn merged(&self, overrides: &PolicyOverrides) -> Policy {
        let positive = PolicyOverrides {
            max_requests: overrides.max_requests.filter(|v| *v > 0),
            window_ms: overrides.window_ms.filter(|v| *v > 0),
            cooldown_ms: overrides.cooldown_ms.filter(|v| *v > 0),
            namespace: overrides.namespace.clone(),
        };
        self.overlaid(&positive)
    }
}

/// Optional replacements for individual [`Policy`] fields.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyOverrides {
    #[serde(default)]
    pub max_requests: Option<u32>,
    #[serde(default)]
    pub window_ms: Option<u64>,
    #[serde(default)]
    pub cooldown_ms: Option<u64>,
    #[serde(default)]
    pub namespace: Option<String>,
}

impl PolicyOverrides {
    /// An empty overlay.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn max_requests(mut self, max_requests: u32) -> Self {
        self.max_requests = Some(max_requests);
        self
    }

    pub fn window_ms(mut self, window_ms: u64) -> Self {
        self.window_ms = Some(window_ms);
        self
    }

    pub fn cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = Some(cooldown_ms);
        self
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    /// Whether this overlay changes nothing.
    pub fn is_empty(&self) -> bool {
        self.max_requests.is_none()
            && self.window_ms.is_none()
            && self.cooldown_ms.is_none()
            && self.namespace.is_none()
    }
}
