use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Basic retry policy template
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    /// Maximum number of attempts (must be > 0)
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Single attempt timeout (unit: milliseconds)
    #[serde(default = "default_op_timeout_ms")]
    pub timeout_ms: u64,

    /// Backoff base (unit: milliseconds)
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,

    /// Maximum backoff time (unit: milliseconds)
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            timeout_ms: default_op_timeout_ms(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl BackoffPolicy {
    pub fn validate(&self) -> Result<()> {
        if self.max_retries == 0 {
            return Err(Error::config("readiness max_retries must be > 0"));
        }
        if self.timeout_ms == 0 {
            return Err(Error::config("readiness timeout_ms must be > 0"));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(Error::config(format!(
                "readiness base_delay_ms {} exceeds max_delay_ms {}",
                self.base_delay_ms, self.max_delay_ms
            )));
        }
        Ok(())
    }

    /// Delay before attempt `attempt + 1`, doubling from the base and capped.
    pub fn delay_for(
        &self,
        attempt: usize,
    ) -> Duration {
        let factor = 1u64 << attempt.min(32);
        let delay = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay)
    }

    pub fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Worst-case wall time spent by a full retry sequence.
    pub fn budget(&self) -> Duration {
        (0..self.max_retries).fold(Duration::ZERO, |acc, attempt| {
            acc + self.attempt_timeout() + self.delay_for(attempt)
        })
    }
}

fn default_max_retries() -> usize {
    20
}
fn default_op_timeout_ms() -> u64 {
    1000
}
fn default_base_delay_ms() -> u64 {
    50
}
fn default_max_delay_ms() -> u64 {
    1000
}
