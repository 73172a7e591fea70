//! Exponential backoff shared by the LLM client and the store connection.

use std::time::Duration;

use rand::Rng;

/// Returns `true` if the HTTP status code is transient and worth retrying.
pub(crate) fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

/// Exponential backoff with +/-25% jitter, starting at `base`.
///
/// The delay never drops below 100ms.
pub(crate) fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let base_ms: u64 = (base.as_millis() as u64)
        .saturating_mul(2u64.saturating_pow(attempt))
        .min(i64::MAX as u64 / 2);
    let jitter_range = base_ms / 4;
    let jitter = if jitter_range > 0 {
        let offset = rand::thread_rng().gen_range(0..=jitter_range * 2);
        offset as i64 - jitter_range as i64
    } else {
        0
    };
    let delay_ms = (base_ms as i64).saturating_add(jitter).max(100) as u64;
    Duration::from_millis(delay_ms)
}

/// Backoff for LLM requests: ~1s, ~2s, ~4s, ...
pub(crate) fn retry_backoff_delay(attempt: u32) -> Duration {
    backoff_delay(Duration::from_secs(1), attempt)
}

/// Backoff for store connection attempts: ~200ms, ~400ms, ~800ms, ...
#[cfg_attr(not(feature = "postgres"), allow(dead_code))]
pub(crate) fn connect_backoff_delay(attempt: u32) -> Duration {
    backoff_delay(Duration::from_millis(200), attempt)
}
