use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one; zero behaves like one.
    #[serde(default = "default_attempts")]
    pub attempts: u32,
    #[serde(default = "default_base_backoff_ms")]
    pub base_backoff_ms: u64,
}

fn default_attempts() -> u32 {
    3
}
fn default_base_backoff_ms() -> u64 {
    2000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: default_attempts(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}

impl RetryPolicy {
    pub fn new(attempts: u32, base_backoff_ms: u64) -> RetryPolicy {
        RetryPolicy {
            attempts,
            base_backoff_ms,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.attempts.max(1)
    }

    /// Delay before attempt `attempt + 1`, where `attempt` counts from zero.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_backoff_ms.saturating_mul(factor))
    }
}
