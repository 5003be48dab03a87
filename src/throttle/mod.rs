//! Request throttling: attempt tracking, admission decisions, and purging.

mod clock;
mod guard;
mod key;
mod ledger;
mod policy;
mod reaper;

pub use clock::{Clock, ManualClock, SystemClock};
pub use guard::{Guard, Verdict};
pub use key::{ledger_key, CallerIdentity, KeyEncoder, PlainKeyEncoder, Sha256KeyEncoder};
pub use ledger::{AttemptRecord, Ledger, Phase};
pub use policy::{
    Policy, PolicyOverrides, DEFAULT_COOLDOWN_MS, DEFAULT_MAX_REQUESTS, DEFAULT_NAMESPACE,
    DEFAULT_WINDOW_MS,
};
pub use reaper::Reaper;
