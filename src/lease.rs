//! Lease Manager (§4.2): the thin wrapper the round driver and bootstrap
//! scheduler use to acquire, hold, and renew the single runner lease.

use crate::config::constants;
use crate::store::EngineStore;
use crate::types::{LeaseId, Time};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Owns the process-local handle to a held lease and renews it on request.
///
/// One `LeaseManager` is shared (via `Arc`) between the round driver thread
/// and the reaper/bootstrap scheduler threads (§5: the lease is acquired
/// once per process lifetime and renewed on a ticker).
pub struct LeaseManager {
    store: Arc<EngineStore>,
    lease_ms: u64,
    held: Mutex<Option<LeaseId>>,
}

impl LeaseManager {
    #[must_use]
    pub fn new(store: Arc<EngineStore>, lease_ms: u64) -> Self {
        Self {
            store,
            lease_ms,
            held: Mutex::new(None),
        }
    }

    /// `ensureStarted` (§4.2): acquires the lease if not already held by
    /// this process. Safe to call on every driver tick; a no-op once held.
    pub fn ensure_started(&self, now: Time) -> bool {
        if self.current().is_some() {
            return true;
        }
        match self.store.acquire_lease_if_vacant(now, self.lease_ms) {
            Some(id) => {
                *self.held.lock() = Some(id);
                debug!(lease = %id, "acquired runner lease");
                true
            }
            None => false,
        }
    }

    /// Renews the held lease; drops process-local tracking (forcing the
    /// next tick to re-acquire) if the store reports it is no longer ours.
    pub fn renew(&self, now: Time) -> bool {
        let Some(id) = self.current() else {
            return false;
        };
        if self.store.renew_lease(id, now, self.lease_ms) {
            true
        } else {
            warn!(lease = %id, "lease renewal rejected, dropping local handle");
            *self.held.lock() = None;
            false
        }
    }

    /// Cheap, read-only re-check that the held lease is still valid for
    /// `expected_generation` (§4.1's "reconfirm the lease" retry path).
    #[must_use]
    pub fn still_valid(&self, expected_generation: u64, now: Time) -> bool {
        match self.current() {
            Some(id) => self.store.validate_lease(id, expected_generation, now),
            None => false,
        }
    }

    #[must_use]
    pub fn current(&self) -> Option<LeaseId> {
        *self.held.lock()
    }

    /// Runs `work` under a background renewal ticker that calls `renew`
    /// every `LEASE_RENEW_INTERVAL_MS` for as long as `work` is in flight
    /// (§4.2: "renews the lease... via an asynchronous background ticker
    /// every 20 s while a long LLM call is in flight"). Suited to a single
    /// prompt/answer call, which can run up to
    /// `MODEL_ATTEMPTS * MODEL_CALL_TIMEOUT_MS` plus backoff — well past the
    /// lease TTL without it.
    pub fn heartbeat_scope<R>(&self, work: impl FnOnce() -> R) -> R {
        let stop = AtomicBool::new(false);
        std::thread::scope(|scope| {
            scope.spawn(|| {
                let step = Duration::from_millis(200);
                while !stop.load(Ordering::Relaxed) {
                    let mut remaining = Duration::from_millis(constants::LEASE_RENEW_INTERVAL_MS);
                    while remaining > Duration::ZERO {
                        if stop.load(Ordering::Relaxed) {
                            return;
                        }
                        let sleep_for = remaining.min(step);
                        std::thread::sleep(sleep_for);
                        remaining = remaining.saturating_sub(sleep_for);
                    }
                    if stop.load(Ordering::Relaxed) {
                        return;
                    }
                    self.renew(Time::now());
                }
            });
            let result = work();
            stop.store(true, Ordering::Relaxed);
            result
        })
    }
}
