//! Retry policy for reply generation.
//!
//! Only transient failures (rate limits, gateway errors, dropped connections)
//! are retried. Client errors such as 400/401 fail immediately.

use std::time::Duration;

/// HTTP statuses treated as transient.
const TRANSIENT_STATUSES: &[u16] = &[429, 500, 502, 503, 504];

/// Lowercased substrings that mark a network-level failure.
const TRANSIENT_MARKERS: &[&str] = &[
    "request failed:",
    "connection reset",
    "connection refused",
    "timed out",
    "broken pipe",
];

/// Exponential backoff settings.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Scale each delay by a fixed per-attempt factor in `[0.6, 0.9]`.
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    pub fn with_retries(retries: u32) -> Self {
        Self {
            max_retries: retries,
            ..Default::default()
        }
    }

    /// Delay before retry number `attempt` (0-indexed).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt.min(30) as i32);
        let capped = (self.initial_delay.as_secs_f64() * exp).min(self.max_delay.as_secs_f64());
        let factor = if self.jitter {
            [0.75, 0.9, 0.6, 0.85][(attempt % 4) as usize]
        } else {
            1.0
        };
        Duration::from_secs_f64(capped * factor)
    }
}

/// Whether an error string from the client describes a retryable failure.
pub fn is_transient_error(error: &str) -> bool {
    if TRANSIENT_STATUSES
        .iter()
        .any(|s| error.contains(&format!("HTTP {s}")))
    {
        return true;
    }
    let lower = error.to_lowercase();
    TRANSIENT_MARKERS.iter().any(|m| lower.contains(m))
}
