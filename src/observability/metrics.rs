//! Runtime counters and gauges for the engine.
//!
//! `Counter`/`Gauge` are plain atomic wrappers rather than `u64`/`i64`
//! fields behind a lock, since these counters are touched from the
//! driver thread, the reaper thread, the bootstrap thread, and the HTTP
//! request-handling threads concurrently.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// A monotonically increasing counter.
#[derive(Debug, Default)]
pub struct Counter(AtomicU64);

impl Counter {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU64::new(0))
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, amount: u64) {
        self.0.fetch_add(amount, Ordering::Relaxed);
    }

    #[must_use]
    pub fn value(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// A gauge that can move up or down.
#[derive(Debug, Default)]
pub struct Gauge(AtomicI64);

impl Gauge {
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicI64::new(0))
    }

    pub fn set(&self, value: i64) {
        self.0.store(value, Ordering::Relaxed);
    }

    pub fn add(&self, delta: i64) {
        self.0.fetch_add(delta, Ordering::Relaxed);
    }

    #[must_use]
    pub fn value(&self) -> i64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Process-wide counters the driver, reaper, and bootstrap loops update,
/// folded into `/admin/status` and asserted on directly by tests.
#[derive(Debug, Default)]
pub struct Metrics {
    pub rounds_created: Counter,
    pub rounds_completed: Counter,
    pub rounds_skipped_prompt_error: Counter,
    pub rounds_skipped_answer_error: Counter,
    pub stale_recoveries: Counter,
    pub model_votes_cast: Counter,
    pub viewer_votes_cast: Counter,
    pub lease_acquisitions: Counter,
    pub lease_losses: Counter,
    pub reaper_rows_expired: Counter,
    pub purge_rows_deleted: Counter,
    pub bootstrap_samples_synthesized: Counter,
    pub active_viewers: Gauge,
}

impl Metrics {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates() {
        let c = Counter::new();
        c.inc();
        c.add(4);
        assert_eq!(c.value(), 5);
    }

    #[test]
    fn gauge_tracks_latest_set() {
        let g = Gauge::new();
        g.add(3);
        g.set(10);
        assert_eq!(g.value(), 10);
    }
}
