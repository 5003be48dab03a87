//! Attempt ledger: per-key streak counters and their transition logic.

use std::cmp::Ordering;
use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::{debug, trace};

use super::policy::Policy;

/// Where a caller currently sits in its streak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Below the limit; requests are admitted
    Accumulating,
    /// The last admitted request reached the limit exactly
    AtLimit,
    /// Over the limit; requests are rejected until the cooldown elapses
    CoolingDown,
}

impl Phase {
    fn classify(count: u32, max_requests: u32) -> Self {
        match count.cmp(&max_requests) {
            Ordering::Less => Phase::Accumulating,
            Ordering::Equal => Phase::AtLimit,
            Ordering::Greater => Phase::CoolingDown,
        }
    }
}

/// Attempt history for a single caller key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptRecord {
    /// Consecutive requests in the current streak
    pub count: u32,
    /// Timestamp (ms) of the last request that moved this record
    pub last_seen_at: u64,
    /// Cooldown captured when the streak started; drives eviction
    pub cooldown_ms: u64,
    /// Phase after the most recent update
    pub phase: Phase,
}

impl AttemptRecord {
    fn new(now: u64, cooldown_ms: u64) -> Self {
        Self {
            count: 0,
            last_seen_at: now,
            cooldown_ms,
            phase: Phase::Accumulating,
        }
    }

    /// Apply one request at `now` under `policy`.
    pub fn record_attempt(&mut self, policy: &Policy, now: u64) {
        self.count = self.count.saturating_add(1);

        match self.count.cmp(&policy.max_requests) {
            Ordering::Less => {
                if self.last_seen_at.saturating_add(policy.window_ms) < now {
                    trace!(gap_ms = now - self.last_seen_at, "Streak broken, restarting");
                    self.restart(policy, now);
                } else {
                    self.touch(now);
                }
            }
            Ordering::Equal => {
                self.touch(now);
            }
            Ordering::Greater => {
                // Anchored to when the limit was reached; rejected attempts
                // do not push the cooldown further out.
                if self.last_seen_at.saturating_add(policy.cooldown_ms) < now {
                    trace!("Cooldown elapsed, restarting streak");
                    self.restart(policy, now);
                }
            }
        }

        self.phase = Phase::classify(self.count, policy.max_requests);
    }

    /// Whether the record's cooldown grace window has fully passed.
    pub fn is_stale(&self, now: u64) -> bool {
        self.last_seen_at.saturating_add(self.cooldown_ms) < now
    }

    fn restart(&mut self, policy: &Policy, now: u64) {
        self.count = 1;
        self.last_seen_at = now;
        self.cooldown_ms = policy.cooldown_ms;
    }

    fn touch(&mut self, now: u64) {
        self.last_seen_at = self.last_seen_at.max(now);
    }
}

/// Mapping from encoded caller key to attempt history.
///
/// All reads and writes go through one mutex so that an update's
/// read-modify-write never interleaves with a sweep.
#[derive(Debug, Default)]
pub struct Ledger {
    entries: Mutex<HashMap<String, AttemptRecord>>,
}

impl Ledger {
    /// Create an empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request for `key` at `now` and return the updated record.
    pub fn update(&self, key: &str, policy: &Policy, now: u64) -> AttemptRecord {
        let mut entries = self.entries.lock();

        let record = entries.entry(key.to_string()).or_insert_with(|| {
            trace!(key = %key, cooldown_ms = policy.cooldown_ms, "Creating attempt record");
            AttemptRecord::new(now, policy.cooldown_ms)
        });

        let before = record.phase;
        record.record_attempt(policy, now);

        if record.phase != before {
            debug!(
                key = %key,
                count = record.count,
                from = ?before,
                to = ?record.phase,
                "Attempt phase changed"
            );
        }

        *record
    }

    /// Evict every record whose cooldown has fully elapsed by `now`.
    ///
    /// Returns the number of evicted records.
    pub fn sweep(&self, now: u64) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();

        let kept: HashMap<String, AttemptRecord> = entries
            .drain()
            .filter(|(_, record)| !record.is_stale(now))
            .collect();
        *entries = kept;

        before - entries.len()
    }

    /// Current record for `key`, if any.
    pub fn get(&self, key: &str) -> Option<AttemptRecord> {
        self.entries.lock().get(key).copied()
    }

    /// Number of tracked keys.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no keys are tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Drop all records.
    ///
    /// This is primarily useful for testing.
    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_requests: u32, window_ms: u64, cooldown_ms: u64) -> Policy {
        Policy {
            max_requests,
            window_ms,
            cooldown_ms,
            ..Policy::default()
        }
    }

    #[test]
    fn test_first_update_creates_record() {
        let ledger = Ledger::new();
        let record = ledger.update("k", &policy(3, 3_000, 15_000), 1_000);

        assert_eq!(record.count, 1);
        assert_eq!(record.last_seen_at, 1_000);
        assert_eq!(record.cooldown_ms, 15_000);
        assert_eq!(record.phase, Phase::Accumulating);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_phases_progress_to_cooldown() {
        let ledger = Ledger::new();
        let p = policy(3, 3_000, 15_000);

        assert_eq!(ledger.update("k", &p, 0).phase, Phase::Accumulating);
        assert_eq!(ledger.update("k", &p, 100).phase, Phase::Accumulating);

        let at_limit = ledger.update("k", &p, 200);
        assert_eq!(at_limit.phase, Phase::AtLimit);
        assert_eq!(at_limit.count, 3);

        let cooling = ledger.update("k", &p, 300);
        assert_eq!(cooling.phase, Phase::CoolingDown);
        assert_eq!(cooling.count, 4);
    }

    #[test]
    fn test_window_gap_restarts_streak() {
        let ledger = Ledger::new();
        let p = policy(3, 3_000, 15_000);

        ledger.update("k", &p, 0);
        let record = ledger.update("k", &p, 3_001);

        assert_eq!(record.count, 1);
        assert_eq!(record.last_seen_at, 3_001);
    }

    #[test]
    fn test_gap_equal_to_window_continues_streak() {
        let ledger = Ledger::new();
        let p = policy(3, 3_000, 15_000);

        ledger.update("k", &p, 0);
        let record = ledger.update("k", &p, 3_000);

        assert_eq!(record.count, 2);
    }

    #[test]
    fn test_rejected_attempts_do_not_extend_cooldown() {
        let ledger = Ledger::new();
        let p = policy(2, 1_000, 10_000);

        ledger.update("k", &p, 0);
        ledger.update("k", &p, 50);

        for t in [1_000, 5_000, 9_000, 10_050] {
            let record = ledger.update("k", &p, t);
            assert_eq!(record.phase, Phase::CoolingDown);
            assert_eq!(record.last_seen_at, 50);
        }

        let record = ledger.update("k", &p, 10_051);
        assert_eq!(record.count, 1);
        assert_eq!(record.last_seen_at, 10_051);
        assert_eq!(record.phase, Phase::Accumulating);
    }

    #[test]
    fn test_cooldown_captured_until_restart() {
        let ledger = Ledger::new();

        ledger.update("k", &policy(5, 3_000, 15_000), 0);
        let record = ledger.update("k", &policy(5, 3_000, 60_000), 10);
        assert_eq!(record.cooldown_ms, 15_000);

        let record = ledger.update("k", &policy(5, 3_000, 60_000), 5_000);
        assert_eq!(record.count, 1);
        assert_eq!(record.cooldown_ms, 60_000);
    }

    #[test]
    fn test_reaching_limit_ignores_window_gap() {
        let ledger = Ledger::new();
        let p = policy(2, 1_000, 15_000);

        ledger.update("k", &p, 0);
        let record = ledger.update("k", &p, 5_000);

        assert_eq!(record.count, 2);
        assert_eq!(record.phase, Phase::AtLimit);
        assert_eq!(record.last_seen_at, 5_000);
    }

    #[test]
    fn test_last_seen_never_moves_backward() {
        let ledger = Ledger::new();
        let p = policy(5, 3_000, 15_000);

        ledger.update("k", &p, 1_000);
        let record = ledger.update("k", &p, 900);

        assert_eq!(record.count, 2);
        assert_eq!(record.last_seen_at, 1_000);
    }

    #[test]
    fn test_single_request_limit() {
        let ledger = Ledger::new();
        let p = policy(1, 3_000, 5_000);

        assert_eq!(ledger.update("k", &p, 0).phase, Phase::AtLimit);
        assert_eq!(ledger.update("k", &p, 10).phase, Phase::CoolingDown);
    }

    #[test]
    fn test_sweep_evicts_only_stale_records() {
        let ledger = Ledger::new();
        let p = policy(3, 3_000, 1_000);

        ledger.update("old", &p, 0);
        ledger.update("edge", &p, 500);
        ledger.update("fresh", &p, 1_400);

        let removed = ledger.sweep(1_500);

        assert_eq!(removed, 1);
        assert!(ledger.get("old").is_none());
        assert!(ledger.get("edge").is_some());
        assert_eq!(ledger.get("fresh").map(|r| r.count), Some(1));
    }

    #[test]
    fn test_sweep_keeps_unthrottled_records_within_grace() {
        let ledger = Ledger::new();
        let p = policy(10, 100, 5_000);

        ledger.update("k", &p, 0);
        assert_eq!(ledger.sweep(4_999), 0);
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_clear() {
        let ledger = Ledger::new();
        ledger.update("k", &Policy::default(), 0);
        assert!(!ledger.is_empty());

        ledger.clear();
        assert!(ledger.is_empty());
    }
}
