//! Background eviction of stale ledger entries.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use super::clock::Clock;
use super::ledger::Ledger;
use crate::error::{GuardError, Result};

/// Periodically sweeps a [`Ledger`] on the current tokio runtime.
///
/// At most one schedule is active at a time. The schedule is cancelled when
/// the reaper is dropped.
pub struct Reaper {
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Reaper {
    /// Create an idle reaper for `ledger`.
    pub fn new(ledger: Arc<Ledger>, clock: Arc<dyn Clock>) -> Self {
        Self {
            ledger,
            clock,
            task: Mutex::new(None),
        }
    }

    /// Run one sweep now. Returns the number of evicted entries.
    pub fn sweep(&self) -> usize {
        sweep_once(&self.ledger, self.clock.as_ref())
    }

    /// Start sweeping every `interval`, replacing any running schedule.
    ///
    /// The first sweep happens one full interval after the call.
    pub fn start(&self, interval: Duration) -> Result<()> {
        if interval.is_zero() {
            return Err(GuardError::Config(
                "purge interval must be greater than zero".to_string(),
            ));
        }

        let runtime = Handle::try_current()
            .map_err(|e| GuardError::Runtime(format!("auto-purge needs a tokio runtime: {}", e)))?;

        let mut task = self.task.lock();
        if let Some(previous) = task.take() {
            debug!("Replacing running purge schedule");
            previous.abort();
        }

        let ledger = Arc::clone(&self.ledger);
        let clock = Arc::clone(&self.clock);

        *task = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                sweep_once(&ledger, clock.as_ref());
            }
        }));

        info!(interval_ms = interval.as_millis() as u64, "Auto-purge started");
        Ok(())
    }

    /// Cancel the schedule. Calling this when idle does nothing.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            info!("Auto-purge stopped");
        }
    }

    /// Whether a schedule is currently active.
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|task| !task.is_finished())
            .unwrap_or(false)
    }
}

impl Drop for Reaper {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

fn sweep_once(ledger: &Ledger, clock: &dyn Clock) -> usize {
    let now = clock.now_ms();
    let evicted = ledger.sweep(now);
    info!(evicted, remaining = ledger.len(), "Swept attempt ledger");
    evicted
}
