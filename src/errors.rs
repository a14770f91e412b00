//! Cluster Harness Error Hierarchy
//!
//! Every failure the harness can report maps onto exactly one top-level
//! variant, so test code can tell an expected failure (for example a
//! deliberately malformed TLS bundle) apart from a harness bug.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use config::ConfigError;

use crate::node::NodeState;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid cluster configuration or harness settings
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// TLS material could not be generated, parsed or written
    #[error(transparent)]
    Provisioning(#[from] ProvisioningError),

    /// Node process failed to start or bind its listeners
    #[error(transparent)]
    Launch(#[from] LaunchError),

    /// Node did not confirm readiness within the allotted window
    #[error("Node {index} did not become ready within {timeout:?}")]
    ConvergenceTimeout { index: usize, timeout: Duration },

    /// Stop/Restart addressed a slot outside `[0, size)`
    #[error("Node index {index} out of range for cluster of size {size}")]
    Index { index: usize, size: usize },

    /// Illegal node state transition
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// Node process did not terminate, even after escalation
    #[error(transparent)]
    Shutdown(#[from] ShutdownError),

    /// Reference store node failures
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Filesystem failures inside the cluster working area
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    /// Certificate or key generation failed
    #[error("Certificate generation failed: {0}")]
    Generate(#[from] rcgen::Error),

    #[error("Failed to read {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    WriteFile {
        path: PathBuf,
        source: std::io::Error,
    },

    /// PEM file holds no certificate block
    #[error("No certificates found in {0}")]
    NoCertificates(PathBuf),

    /// PEM file holds no private key block
    #[error("No private key found in {0}")]
    NoPrivateKey(PathBuf),

    /// rustls rejected the certificate, key or CA bundle
    #[error("TLS configuration rejected: {0}")]
    Rustls(String),

    /// HTTP client could not be built from the TLS bundle
    #[error("HTTP client setup failed: {0}")]
    HttpClient(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Failed to spawn node {index} ({program}): {source}")]
    Spawn {
        index: usize,
        program: PathBuf,
        source: std::io::Error,
    },

    /// Another socket already owns one of the node's listen addresses
    #[error("Node {index} cannot bind {addr}: address already in use")]
    PortInUse { index: usize, addr: SocketAddr },

    /// Process died before its listeners were confirmed
    #[error("Node {index} exited before accepting connections: {status}")]
    Exited { index: usize, status: String },

    /// Data directory or log file of the node could not be set up
    #[error("Failed to prepare {path} for node {index}: {source}")]
    Prepare {
        index: usize,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config for node {index} at {path}: {source}")]
    WriteConfig {
        index: usize,
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to render config for node {index}: {source}")]
    RenderConfig {
        index: usize,
        source: toml::ser::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Cannot {operation} node {index} while it is {state}")]
    InvalidTransition {
        index: usize,
        operation: &'static str,
        state: NodeState,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum ShutdownError {
    /// Termination signal could not be delivered
    #[error("Failed to signal node {index}: {source}")]
    Signal {
        index: usize,
        source: std::io::Error,
    },

    /// Process still alive after SIGKILL
    #[error("Node {index} was not reaped within {timeout:?} after SIGKILL")]
    NotReaped { index: usize, timeout: Duration },

    #[error("Failed to wait on node {index}: {source}")]
    Wait {
        index: usize,
        source: std::io::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Data directory was initialised by another cluster or another node
    #[error("Data directory belongs to {found}, refusing to start as {expected}")]
    ForeignDataDir { expected: String, found: String },

    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Corrupted store file {path}: {source}")]
    Corrupted {
        path: PathBuf,
        source: bincode::Error,
    },

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

impl Error {
    /// Shorthand for a configuration validation failure.
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Error::Config(ConfigError::Message(msg.into()))
    }

    /// The node index the error refers to, when there is one.
    pub fn node_index(&self) -> Option<usize> {
        match self {
            Error::ConvergenceTimeout { index, .. } | Error::Index { index, .. } => Some(*index),
            Error::Launch(e) => Some(e.index()),
            Error::Lifecycle(LifecycleError::InvalidTransition { index, .. }) => Some(*index),
            Error::Shutdown(e) => Some(e.index()),
            _ => None,
        }
    }
}

impl LaunchError {
    pub fn index(&self) -> usize {
        match self {
            LaunchError::Spawn { index, .. }
            | LaunchError::PortInUse { index, .. }
            | LaunchError::Exited { index, .. }
            | LaunchError::Prepare { index, .. }
            | LaunchError::WriteConfig { index, .. }
            | LaunchError::RenderConfig { index, .. } => *index,
        }
    }
}

impl ShutdownError {
    pub fn index(&self) -> usize {
        match self {
            ShutdownError::Signal { index, .. }
            | ShutdownError::NotReaped { index, .. }
            | ShutdownError::Wait { index, .. } => *index,
        }
    }
}

// ============== Conversion Implementations ============== //
impl From<rcgen::Error> for Error {
    fn from(e: rcgen::Error) -> Self {
        Error::Provisioning(ProvisioningError::Generate(e))
    }
}
