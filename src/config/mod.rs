//! Configuration management for the cluster harness.
//!
//! [`ClusterConfig`] is what a test hands to [`crate::Cluster::start`].
//! [`HarnessSettings`] carries the ambient knobs (which binary to launch,
//! timeouts, readiness polling) and can be loaded from multiple sources with
//! priority:
//! 1. Default values (hardcoded)
//! 2. Explicit config file
//! 3. File named by `HARNESS_CONFIG_PATH`
//! 4. Environment variables `HARNESS__*` (highest priority)
//!

mod cluster;
mod launch;
mod lifecycle;
mod retry;
mod tls;
pub use cluster::*;
pub use launch::*;
pub use lifecycle::*;
pub use retry::*;
pub use tls::*;


//---
use std::env;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Result;

pub const HARNESS_CONFIG_PATH_ENV: &str = "HARNESS_CONFIG_PATH";
pub const HARNESS_ENV_PREFIX: &str = "HARNESS";

#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct HarnessSettings {
    /// Store node executable and its environment
    #[serde(default)]
    pub node: NodeLaunchConfig,

    /// Start/stop bounds for node processes
    #[serde(default)]
    pub lifecycle: LifecycleTimeouts,

    /// Poll-until-ready policy used by `Cluster::wait_ready`
    #[serde(default)]
    pub readiness: BackoffPolicy,
}

impl HarnessSettings {
    /// Load settings from multiple sources with priority:
    /// 1. Hardcoded defaults
    /// 2. `path`, when given (must exist)
    /// 3. `HARNESS_CONFIG_PATH`, when set (must exist)
    /// 4. Environment variables
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        if let Ok(path) = env::var(HARNESS_CONFIG_PATH_ENV) {
            builder = builder.add_source(File::with_name(&path).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(HARNESS_ENV_PREFIX)
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn with_program(
        mut self,
        program: impl Into<std::path::PathBuf>,
    ) -> Self {
        self.node.program = program.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.node.validate()?;
        self.lifecycle.validate()?;
        self.readiness.validate()
    }
}
