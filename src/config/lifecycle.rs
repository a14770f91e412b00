use std::time::Duration;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Bounds for every blocking wait on a node process.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleTimeouts {
    /// How long a (re)launched process gets to accept on its listeners
    #[serde(default = "default_start_timeout_ms")]
    pub start_timeout_ms: u64,

    /// Time between SIGTERM and escalation to SIGKILL
    #[serde(default = "default_stop_grace_period_ms")]
    pub stop_grace_period_ms: u64,

    /// Time allowed for the kernel to reap a SIGKILLed process
    #[serde(default = "default_kill_timeout_ms")]
    pub kill_timeout_ms: u64,

    /// Pause between listener probes while a node is starting
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
}

impl Default for LifecycleTimeouts {
    fn default() -> Self {
        Self {
            start_timeout_ms: default_start_timeout_ms(),
            stop_grace_period_ms: default_stop_grace_period_ms(),
            kill_timeout_ms: default_kill_timeout_ms(),
            probe_interval_ms: default_probe_interval_ms(),
        }
    }
}

impl LifecycleTimeouts {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("start_timeout_ms", self.start_timeout_ms),
            ("stop_grace_period_ms", self.stop_grace_period_ms),
            ("kill_timeout_ms", self.kill_timeout_ms),
            ("probe_interval_ms", self.probe_interval_ms),
        ] {
            if value == 0 {
                return Err(Error::config(format!("lifecycle {name} must be > 0")));
            }
        }
        if self.probe_interval_ms >= self.start_timeout_ms {
            return Err(Error::config(format!(
                "lifecycle probe_interval_ms {} must be < start_timeout_ms {}",
                self.probe_interval_ms, self.start_timeout_ms
            )));
        }
        Ok(())
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_millis(self.start_timeout_ms)
    }

    pub fn stop_grace_period(&self) -> Duration {
        Duration::from_millis(self.stop_grace_period_ms)
    }

    pub fn kill_timeout(&self) -> Duration {
        Duration::from_millis(self.kill_timeout_ms)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

fn default_start_timeout_ms() -> u64 {
    10_000
}
fn default_stop_grace_period_ms() -> u64 {
    5_000
}
fn default_kill_timeout_ms() -> u64 {
    2_000
}
fn default_probe_interval_ms() -> u64 {
    50
}
