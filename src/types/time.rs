//! Wall-clock time as milliseconds since the Unix epoch.
//!
//! Every timestamp in the data model (§3) is wall-clock ms since epoch.
//! A dedicated `Time` newtype (rather than a bare `u64` or `SystemTime`)
//! keeps arithmetic on deadlines readable and keeps serialization to JSON
//! a plain integer, matching the wire shape admin/UI consumers expect.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct Time(pub u64);

impl Time {
    /// Reads the current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self(ms as u64)
    }

    /// Builds a `Time` from a raw millisecond count (mainly for tests).
    #[must_use]
    pub const fn from_millis(ms: u64) -> Self {
        Self(ms)
    }

    /// Adds a duration in milliseconds, saturating at `u64::MAX`.
    #[must_use]
    pub fn plus_millis(self, ms: u64) -> Self {
        Self(self.0.saturating_add(ms))
    }

    /// Milliseconds remaining until `self`, relative to `now`; zero if `self <= now`.
    #[must_use]
    pub fn remaining_from(self, now: Self) -> u64 {
        self.0.saturating_sub(now.0)
    }

    /// Milliseconds elapsed since `self`, relative to `now`; zero if `self >= now`.
    #[must_use]
    pub fn elapsed_since(self, now: Self) -> u64 {
        now.0.saturating_sub(self.0)
    }

    /// `true` iff `self` is at or before `now` (deadline passed).
    #[must_use]
    pub fn has_passed(self, now: Self) -> bool {
        self.0 <= now.0
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
