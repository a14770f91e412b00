use std::path::Path;
use std::path::PathBuf;

use super::node_name;
use crate::constants::CONF_DIR;
use crate::constants::LOGS_DIR;

/// Deterministic placement of every per-node file under the cluster root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterLayout {
    root: PathBuf,
}

impl ClusterLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/node-<i>/`
    pub fn data_dir(
        &self,
        index: usize,
    ) -> PathBuf {
        self.root.join(node_name(index))
    }

    /// `<root>/conf/node-<i>.toml`
    pub fn config_file(
        &self,
        index: usize,
    ) -> PathBuf {
        self.root.join(CONF_DIR).join(format!("{}.toml", node_name(index)))
    }

    /// `<root>/logs/node-<i>.log`
    pub fn log_file(
        &self,
        index: usize,
    ) -> PathBuf {
        self.root.join(LOGS_DIR).join(format!("{}.log", node_name(index)))
    }

    /// `<root>/logs/node-<i>.stderr`
    pub fn stderr_file(
        &self,
        index: usize,
    ) -> PathBuf {
        self.root.join(LOGS_DIR).join(format!("{}.stderr", node_name(index)))
    }
}
