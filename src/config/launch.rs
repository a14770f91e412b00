use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// How to launch one store node process.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NodeLaunchConfig {
    /// Store node executable; resolved through `PATH` when relative
    #[serde(default = "default_program")]
    pub program: PathBuf,

    /// Arguments passed to the program; the node reads its configuration
    /// from the file named by `CONFIG_PATH`, not from the command line
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment for every node process
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Forwarded to the node as `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for NodeLaunchConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
            env: BTreeMap::new(),
            log_level: default_log_level(),
        }
    }
}

impl NodeLaunchConfig {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.program.as_os_str().is_empty() {
            return Err(Error::config("node program cannot be empty"));
        }
        Ok(())
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("d-engine-harness")
}
fn default_log_level() -> String {
    "info".into()
}
