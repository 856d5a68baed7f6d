//! Retry policies for failed or timed-out task attempts.

use serde::{Deserialize, Serialize};

/// How a task reacts once an attempt fails or times out.
///
/// `previous_attempts` is always the number of failed or timed-out
/// attempts already recorded in history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum RetryStrategy {
    /// Never retry
    #[default]
    None,

    /// Retry straight away, up to `limit` times
    Immediate { limit: u32 },

    /// Wait `delay` seconds before each retry
    ConstantBackoff { delay: u64, limit: u32 },

    /// Wait `start * 2^n` seconds before retry number `n`
    ExponentialBackoff { start: u64, limit: u32 },
}

impl RetryStrategy {
    /// Check if another attempt is allowed
    pub fn should_retry(&self, previous_attempts: u32) -> bool {
        match self {
            RetryStrategy::None => false,
            RetryStrategy::Immediate { limit }
            | RetryStrategy::ConstantBackoff { limit, .. }
            | RetryStrategy::ExponentialBackoff { limit, .. } => previous_attempts < *limit,
        }
    }

    /// Seconds to wait before the next attempt
    pub fn backoff_seconds(&self, previous_attempts: u32) -> u64 {
        match self {
            RetryStrategy::None | RetryStrategy::Immediate { .. } => 0,
            RetryStrategy::ConstantBackoff { delay, .. } => *delay,
            RetryStrategy::ExponentialBackoff { start, .. } => {
                let factor = 2u64.checked_pow(previous_attempts).unwrap_or(u64::MAX);
                start.saturating_mul(factor)
            }
        }
    }
}
