//! Periodic work: the probe tick loop and the daily digest.

mod digest;
mod tick;

pub use digest::{DigestConfig, DigestScheduler, next_digest_after};
pub use tick::{ProbeScheduler, SchedulerConfig, TickSummary, write_status_file};
