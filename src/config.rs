//! Environment-driven configuration and the engine's tuning constants (§4, §6).

use crate::types::RunsMode;
use std::env;
use std::net::SocketAddr;

/// Magic numbers named throughout §4, collected so every module references
/// one source of truth instead of re-deriving them.
pub mod constants {
    /// Lease duration renewed by the `LeaseManager` (§4.2).
    pub const RUNNER_LEASE_MS: u64 = 60_000;
    /// How often the driver renews its lease, both via the heartbeat ticker
    /// during long LLM calls and inside the voting-window poll loop (§4.2).
    pub const LEASE_RENEW_INTERVAL_MS: u64 = 20_000;
    /// Bounded retry count inside the LLM adapter (§4.3.3, §7).
    pub const MODEL_ATTEMPTS: u32 = 3;
    /// Per-call timeout enforced by the adapter (§4.3.3).
    pub const MODEL_CALL_TIMEOUT_MS: u64 = 60_000;
    /// Backoff delays between attempts (§4.3.3): `[1s, 2s]`.
    pub const MODEL_RETRY_BACKOFF_MS: [u64; 2] = [1_000, 2_000];
    /// Pause after skipping a round before the next one is created (§4.3 step 9/10).
    pub const SKIPPED_ROUND_DELAY_MS: u64 = 10_000;
    /// Pause after finalizing a round before the next one is created (§4.3 step 12).
    pub const POST_ROUND_DELAY_MS: u64 = 5_000;
    /// Reschedule delay when the loop cannot proceed (paused, insufficient
    /// models, insufficient role coverage) (§4.3 steps 3, 5, 5-retry).
    pub const IDLE_RESCHEDULE_MS: u64 = 1_000;
    /// Reschedule delay after a non-recovering SPR call (§4.3 step 4).
    pub const SPR_RETRY_MS: u64 = 750;
    /// Reschedule delay after a round-creation race (§4.3 step 7).
    pub const CREATE_ROUND_RETRY_MS: u64 = 300;
    /// Minimum number of active models required to run a round (§4.3 step 5).
    pub const MIN_ACTIVE_MODELS: usize = 3;
    /// Grace period granted to the model-vote fan-out after the viewer
    /// window closes, before SPR is requested (§4.3.5).
    pub const VOTE_FANOUT_GRACE_MS: u64 = 300;

    /// Viewer voting window when viewers are present at round start (§4.7).
    pub const VIEWER_VOTE_WINDOW_ACTIVE_MS: u64 = 30_000;
    /// Viewer voting window when no viewers are present at round start (§4.7).
    pub const VIEWER_VOTE_WINDOW_IDLE_MS: u64 = 120_000;

    /// Presence TTL from each heartbeat (§4.8).
    pub const PRESENCE_TTL_MS: u64 = 30_000;
    /// Reaper scheduling delay (§4.8).
    pub const REAP_SCHEDULE_MS: u64 = 5_000;
    /// Rows reaped per `reapExpired` call (§4.8).
    pub const REAP_BATCH_LIMIT: usize = 500;
    /// Hard cap on rows reaped per call (§4.8).
    pub const REAP_BATCH_MAX: usize = 1_000;
    /// Number of presence/vote-tally shards (§3, §4.8).
    pub const SHARD_COUNT: usize = 64;

    /// Rows purged per batch on generation reset (§4.4).
    pub const PURGE_BATCH_SIZE: usize = 500;

    /// Phase-level stale thresholds (§4.3.3, §4.6): attempts * timeout +
    /// backoff + grace.
    pub const PROMPT_STALE_MS: u64 = MODEL_ATTEMPTS as u64 * MODEL_CALL_TIMEOUT_MS
        + MODEL_RETRY_BACKOFF_MS[0]
        + MODEL_RETRY_BACKOFF_MS[1]
        + 15_000;
    pub const ANSWER_STALE_MS: u64 = MODEL_CALL_TIMEOUT_MS + 15_000;
    pub const VOTE_STALE_MS: u64 = PROMPT_STALE_MS;

    /// Minimum non-error samples the projection bootstrap ensures per
    /// `(model, request_type, metrics_epoch, generation)` (§4.9).
    pub const BOOTSTRAP_MIN_SAMPLES: usize = 5;
    /// Attempts per bootstrap action per model (§4.9).
    pub const BOOTSTRAP_MAX_ATTEMPTS: u32 = 30;
    /// A bootstrap run older than this is considered abandoned (§4.9).
    pub const BOOTSTRAP_STALE_MS: u64 = 30 * 60 * 1_000;

    /// Interval at which live reasoning-progress updates are coalesced (§4.3.3).
    pub const REASONING_PROGRESS_COALESCE_MS: u64 = 1_000;
}

/// Engine-wide configuration assembled from the process environment (§6).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Shared-secret header value required on every `/admin/*` request.
    pub admin_passcode: String,
    /// Origins allowed to receive CORS headers; `*` if unset.
    pub allowed_origins: Vec<String>,
    /// How often the (out-of-scope) platform viewer-presence poller runs.
    pub platform_viewer_poll_interval_ms: u64,
    /// Max models the projection bootstrap runs concurrently (§4.9): 1-3.
    pub bootstrap_model_concurrency: usize,
    /// Address the admin/chat-bridge HTTP surface binds to.
    pub bind_addr: SocketAddr,
    /// Infinite vs. finite tournament mode (§9 open question; infinite by default).
    pub runs_mode: RunsMode,
    /// Required when `runs_mode == Finite`.
    pub total_rounds: Option<u64>,
}

impl EngineConfig {
    /// Reads configuration from environment variables, falling back to
    /// development-friendly defaults where a value is not security-critical.
    #[must_use]
    pub fn from_env() -> Self {
        let admin_passcode = env::var("ADMIN_PASSCODE").unwrap_or_default();
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        let platform_viewer_poll_interval_ms = env::var("PLATFORM_VIEWER_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(15_000);
        let bootstrap_model_concurrency = env::var("PROJECTION_BOOTSTRAP_MODEL_CONCURRENCY")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(|n: usize| n.clamp(1, 3))
            .unwrap_or(2);
        let bind_addr = env::var("JESTLOOP_BIND_ADDR")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| "0.0.0.0:8787".parse().expect("valid default bind addr"));

        Self {
            admin_passcode,
            allowed_origins,
            platform_viewer_poll_interval_ms,
            bootstrap_model_concurrency,
            bind_addr,
            runs_mode: RunsMode::Infinite,
            total_rounds: None,
        }
    }

    /// `true` if `origin` should receive permissive CORS headers.
    #[must_use]
    pub fn origin_allowed(&self, origin: &str) -> bool {
        self.allowed_origins.is_empty()
            || self.allowed_origins.iter().any(|o| o == "*" || o == origin)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stale_thresholds_match_spec_arithmetic() {
        assert_eq!(constants::PROMPT_STALE_MS, 198_000);
        assert_eq!(constants::ANSWER_STALE_MS, 75_000);
        assert_eq!(constants::VOTE_STALE_MS, constants::PROMPT_STALE_MS);
    }

    #[test]
    fn origin_allowed_defaults_permissive_when_unset() {
        let mut cfg = EngineConfig::from_env();
        cfg.allowed_origins.clear();
        assert!(cfg.origin_allowed("https://example.com"));
    }

    #[test]
    fn origin_allowed_restricts_when_set() {
        let mut cfg = EngineConfig::from_env();
        cfg.allowed_origins = vec!["https://ok.example".to_string()];
        assert!(cfg.origin_allowed("https://ok.example"));
        assert!(!cfg.origin_allowed("https://evil.example"));
    }
}
