//! Round-count normalisation for free-form user input.
//!
//! Always yields a usable value so the start control never blocks on bad input.

use crate::model::MAX_ROUNDS;

const MIN_ROUNDS: u32 = 1;

/// Normalise raw text into a round count in `[1, MAX_ROUNDS]`.
///
/// Blank input counts as zero, anything unparseable or non-finite becomes 1.
pub fn normalize_rounds(raw: &str) -> u32 {
    let trimmed = raw.trim();
    let value = if trimmed.is_empty() {
        0.0
    } else {
        trimmed.parse::<f64>().unwrap_or(f64::NAN)
    };
    normalize_rounds_value(value)
}

/// Numeric variant of [`normalize_rounds`]: clamp, then truncate toward zero.
pub fn normalize_rounds_value(value: f64) -> u32 {
    if !value.is_finite() {
        return MIN_ROUNDS;
    }
    value.clamp(MIN_ROUNDS as f64, MAX_ROUNDS as f64).trunc() as u32
}
