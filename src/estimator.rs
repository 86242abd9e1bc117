//! Reasoning-token estimation from streamed character deltas, with
//! per-`(model, effort, call type)` calibration feedback (§4.5).

use crate::types::{ModelId, ReasoningEffort, RequestType};
use parking_lot::Mutex;
use std::collections::HashMap;

const CALIBRATION_MIN: f64 = 0.45;
const CALIBRATION_MAX: f64 = 1.45;
const CALIBRATION_INITIAL: f64 = 0.92;

/// Raw per-character token-rate constants (§4.5), expressed as tokens per
/// character so estimation is a single multiply-accumulate per class.
mod char_rates {
    pub const LATIN: f64 = 1.0 / 4.6;
    pub const DIGIT: f64 = 1.0 / 3.1;
    pub const CJK: f64 = 1.1;
    pub const PUNCTUATION: f64 = 0.24;
    pub const OTHER: f64 = 1.0 / 3.5;
    pub const WHITESPACE_CAP: f64 = 0.9;
}

fn is_cjk(c: char) -> bool {
    matches!(c as u32,
        0x4E00..=0x9FFF | 0x3040..=0x30FF | 0xAC00..=0xD7A3 | 0x3400..=0x4DBF)
}

/// Counts raw (uncalibrated) estimated tokens in `text` by character class.
#[must_use]
pub fn raw_token_estimate(text: &str) -> f64 {
    let mut whitespace_tokens = 0.0f64;
    let mut total = 0.0f64;
    for c in text.chars() {
        if c.is_whitespace() {
            whitespace_tokens += 1.0;
            continue;
        }
        total += if is_cjk(c) {
            char_rates::CJK
        } else if c.is_ascii_digit() {
            char_rates::DIGIT
        } else if c.is_ascii_punctuation() {
            char_rates::PUNCTUATION
        } else if c.is_alphabetic() {
            char_rates::LATIN
        } else {
            char_rates::OTHER
        };
    }
    total + whitespace_tokens.min(char_rates::WHITESPACE_CAP)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CalibrationKey {
    model_id_hash: u64,
    effort: Option<ReasoningEffort>,
    call_type: RequestType,
}

fn hash_model_id(id: &ModelId) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in id.0.as_bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    hash
}

struct CalibrationEntry {
    factor: f64,
    samples: u32,
}

/// Process-local calibration state (§9: "does not need to be persisted").
///
/// One instance is shared across the driver's LLM calls; cold start
/// recalibrates after a handful of samples, exactly as §9 anticipates, and
/// the source explicitly allows divergence between processes since only
/// one driver process ever holds the lease at a time.
pub struct ReasoningEstimator {
    calibration: Mutex<HashMap<CalibrationKey, CalibrationEntry>>,
}

impl ReasoningEstimator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            calibration: Mutex::new(HashMap::new()),
        }
    }

    fn factor(&self, key: CalibrationKey) -> f64 {
        self.calibration
            .lock()
            .get(&key)
            .map_or(CALIBRATION_INITIAL, |e| e.factor)
    }

    /// Applies the current calibration factor to a raw character-class
    /// estimate, flooring at 0 and integer-flooring the token count, per
    /// §4.5's "flooring at 0 and integer-flooring the count".
    #[must_use]
    pub fn estimate_tokens(
        &self,
        model_id: &ModelId,
        effort: Option<ReasoningEffort>,
        call_type: RequestType,
        text: &str,
    ) -> u64 {
        let key = CalibrationKey {
            model_id_hash: hash_model_id(model_id),
            effort,
            call_type,
        };
        let calibrated = raw_token_estimate(text) * self.factor(key);
        calibrated.max(0.0).floor() as u64
    }

    /// Feeds back a provider-reported ground-truth reasoning-token count
    /// after a call completes, updating the EMA calibration factor: `α=0.2`
    /// for fewer than 4 prior samples, else `α=0.1` (§4.5).
    pub fn record_ground_truth(
        &self,
        model_id: &ModelId,
        effort: Option<ReasoningEffort>,
        call_type: RequestType,
        provider_actual_reasoning_tokens: u64,
        local_estimated_raw_tokens: f64,
    ) {
        if local_estimated_raw_tokens <= 0.0 {
            return;
        }
        let ratio = provider_actual_reasoning_tokens as f64 / local_estimated_raw_tokens;
        let key = CalibrationKey {
            model_id_hash: hash_model_id(model_id),
            effort,
            call_type,
        };
        let mut table = self.calibration.lock();
        let entry = table.entry(key).or_insert(CalibrationEntry {
            factor: CALIBRATION_INITIAL,
            samples: 0,
        });
        let alpha = if entry.samples < 4 { 0.2 } else { 0.1 };
        entry.factor = (entry.factor * (1.0 - alpha) + ratio * alpha).clamp(CALIBRATION_MIN, CALIBRATION_MAX);
        entry.samples += 1;
    }
}

impl Default for ReasoningEstimator {
    fn default() -> Self {
        Self::new()
    }
}
