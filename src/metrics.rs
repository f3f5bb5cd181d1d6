use std::time::Instant;

/// Standard word length for WPM.
pub const CHARS_PER_WORD: f64 = 5.0;
/// Lower bound on the WPM denominator (one millisecond, in minutes).
pub const MIN_ELAPSED_MINUTES: f64 = 1.0 / 60_000.0;

/// Live numbers for display, frozen once the session ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub wpm: f64,
    pub accuracy: f64,
    pub remaining_seconds: u32,
    pub elapsed_seconds: f64,
    pub hits: usize,
    pub errors: usize,
    pub ended: bool,
}

/// Wall-clock time since start plus accumulated penalties.
pub fn effective_elapsed_ms(started_at: Instant, now: Instant, penalty_ms: u64) -> u64 {
    let wall = now.saturating_duration_since(started_at).as_millis();
    u64::try_from(wall).unwrap_or(u64::MAX).saturating_add(penalty_ms)
}

pub fn wpm(hits: usize, elapsed_seconds: f64) -> f64 {
    let gross_words = hits as f64 / CHARS_PER_WORD;
    let minutes = (elapsed_seconds.max(0.0) / 60.0).max(MIN_ELAPSED_MINUTES);
    gross_words / minutes
}

/// 100 when nothing has been typed.
pub fn accuracy(hits: usize, errors: usize) -> f64 {
    let total = hits + errors;
    if total == 0 {
        100.0
    } else {
        hits as f64 / total as f64 * 100.0
    }
}

pub fn remaining_seconds(duration_secs: u32, elapsed_seconds: f64) -> u32 {
    let left = (f64::from(duration_secs) - elapsed_seconds).ceil();
    if left <= 0.0 {
        0
    } else {
        left as u32
    }
}

pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Population standard deviation.
pub fn std_dev(data: &[f64]) -> Option<f64> {
    let data_mean = mean(data)?;
    let variance = data
        .iter()
        .map(|value| {
            let diff = data_mean - *value;
            diff * diff
        })
        .sum::<f64>()
        / data.len() as f64;

    Some(variance.sqrt())
}
