//! Admission decisions on top of the attempt ledger.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use super::clock::{Clock, SystemClock};
use super::key::{ledger_key, CallerIdentity, KeyEncoder, Sha256KeyEncoder};
use super::ledger::{AttemptRecord, Ledger};
use super::policy::{Policy, PolicyOverrides};
use super::reaper::Reaper;
use crate::error::Result;

/// Outcome of evaluating one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Admit,
    Reject,
}

impl Verdict {
    pub fn is_admit(&self) -> bool {
        matches!(self, Verdict::Admit)
    }

    /// HTTP status a host adapter would answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            Verdict::Admit => 200,
            Verdict::Reject => 403,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Admit => write!(f, "ADMIT"),
            Verdict::Reject => write!(f, "REJECT"),
        }
    }
}

/// The request-throttling guard.
///
/// Owns the attempt ledger, the process-wide default policy, and the
/// auto-purge schedule. It is thread-safe and meant to be shared behind an
/// `Arc` by whatever composes the request pipeline.
pub struct Guard {
    ledger: Arc<Ledger>,
    defaults: RwLock<Policy>,
    clock: Arc<dyn Clock>,
    encoder: Arc<dyn KeyEncoder>,
    reaper: Reaper,
}

impl Guard {
    /// Create a guard using the system clock and SHA-256 key encoding.
    pub fn new(defaults: Policy) -> Result<Self> {
        Self::with_parts(defaults, Arc::new(SystemClock), Arc::new(Sha256KeyEncoder))
    }

    /// Create a guard with a custom clock and key encoder.
    pub fn with_parts(
        defaults: Policy,
        clock: Arc<dyn Clock>,
        encoder: Arc<dyn KeyEncoder>,
    ) -> Result<Self> {
        defaults.validate()?;

        let ledger = Arc::new(Ledger::new());
        let reaper = Reaper::new(Arc::clone(&ledger), Arc::clone(&clock));

        Ok(Self {
            ledger,
            defaults: RwLock::new(defaults),
            clock,
            encoder,
            reaper,
        })
    }

    /// Merge `overrides` into the process-wide default policy.
    ///
    /// The defaults are left untouched if the merged policy is invalid.
    pub fn configure(&self, overrides: PolicyOverrides) -> Result<()> {
        let mut defaults = self.defaults.write();

        let merged = defaults.overlaid(&overrides);
        merged.validate()?;

        info!(
            max_requests = merged.max_requests,
            window_ms = merged.window_ms,
            cooldown_ms = merged.cooldown_ms,
            namespace = %merged.namespace,
            "Default policy updated"
        );
        *defaults = merged;
        Ok(())
    }

    /// Current default policy.
    pub fn policy(&self) -> Policy {
        self.defaults.read().clone()
    }

    /// Evaluate a request from `raw_key` under the default policy.
    pub fn evaluate(&self, raw_key: &str) -> Verdict {
        self.evaluate_with(raw_key, &PolicyOverrides::default())
    }

    /// Evaluate a request from `raw_key` under the defaults overlaid with
    /// `overrides`.
    ///
    /// Always records the attempt, including rejected ones.
    pub fn evaluate_with(&self, raw_key: &str, overrides: &PolicyOverrides) -> Verdict {
        let policy = self.defaults.read().merged(overrides);
        let (verdict, record) = self.decide(raw_key, &policy);

        if verdict == Verdict::Reject {
            debug!(
                namespace = %policy.namespace,
                count = record.count,
                max_requests = policy.max_requests,
                "Request throttled"
            );
        }

        verdict
    }

    /// Run `on_admit` or `on_reject` depending on the caller's verdict under
    /// the default policy.
    pub fn protect<C, T, A, R>(&self, caller: &C, on_admit: A, on_reject: R) -> T
    where
        C: CallerIdentity + ?Sized,
        A: FnOnce() -> T,
        R: FnOnce() -> T,
    {
        self.protect_with(caller, &PolicyOverrides::default(), on_admit, on_reject)
    }

    /// Like [`Guard::protect`], with per-route overrides.
    pub fn protect_with<C, T, A, R>(
        &self,
        caller: &C,
        overrides: &PolicyOverrides,
        on_admit: A,
        on_reject: R,
    ) -> T
    where
        C: CallerIdentity + ?Sized,
        A: FnOnce() -> T,
        R: FnOnce() -> T,
    {
        match self.evaluate_with(&caller.caller_identity(), overrides) {
            Verdict::Admit => on_admit(),
            Verdict::Reject => on_reject(),
        }
    }

    /// Current ledger record for `raw_key` under `namespace`, without
    /// recording an attempt.
    pub fn record(&self, namespace: &str, raw_key: &str) -> Option<AttemptRecord> {
        let key = ledger_key(self.encoder.as_ref(), namespace, raw_key);
        self.ledger.get(&key)
    }

    /// Start periodic purging. Defaults to ten times the default cooldown.
    pub fn start_auto_purge(&self, interval: Option<Duration>) -> Result<()> {
        let interval = interval.unwrap_or_else(|| self.default_purge_interval());
        self.reaper.start(interval)
    }

    /// Cancel periodic purging.
    pub fn stop_auto_purge(&self) {
        self.reaper.stop();
    }

    /// Whether periodic purging is active.
    pub fn auto_purge_running(&self) -> bool {
        self.reaper.is_running()
    }

    /// Evict stale entries immediately. Returns the number evicted.
    pub fn purge_now(&self) -> usize {
        self.reaper.sweep()
    }

    /// The underlying ledger.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    fn default_purge_interval(&self) -> Duration {
        let cooldown_ms = self.defaults.read().cooldown_ms;
        Duration::from_millis(cooldown_ms.saturating_mul(10))
    }

    fn decide(&self, raw_key: &str, policy: &Policy) -> (Verdict, AttemptRecord) {
        let key = ledger_key(self.encoder.as_ref(), &policy.namespace, raw_key);
        let record = self.ledger.update(&key, policy, self.clock.now_ms());

        trace!(
            key = %key,
            count = record.count,
            phase = ?record.phase,
            "Evaluated request"
        );

        let verdict = if record.count > policy.max_requests {
            Verdict::Reject
        } else {
            Verdict::Admit
        };
        (verdict, record)
    }
}
