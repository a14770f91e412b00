use std::path::PathBuf;

use crate::port::ports_per_cluster;
use crate::Error;
use crate::HarnessSettings;
use crate::Result;
use crate::TlsInfo;

/// Caller supplied description of one local cluster.
///
/// Immutable once handed to [`crate::Cluster::start`]; the cluster keeps its
/// own copy.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    /// Number of nodes, must be >= 1
    pub size: usize,

    /// Base directory; every node gets `root_dir/node-<i>`
    pub root_dir: PathBuf,

    /// Base port; node `i` listens on `root_port + 2i` (peer) and
    /// `root_port + 2i + 1` (client)
    pub root_port: u16,

    /// Manually supplied peer transport TLS bundle
    pub peer_tls_info: TlsInfo,

    /// Manually supplied client transport TLS bundle
    pub client_tls_info: TlsInfo,

    /// Generate a CA and per-node certificates for the peer transport
    pub peer_auto_tls: bool,

    /// Generate a CA and per-node certificates for the client transport
    pub client_auto_tls: bool,

    /// Launch, timeout and readiness settings
    pub settings: HarnessSettings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            size: 1,
            root_dir: std::env::temp_dir().join("d-engine-harness"),
            root_port: default_root_port(),
            peer_tls_info: TlsInfo::default(),
            client_tls_info: TlsInfo::default(),
            peer_auto_tls: false,
            client_auto_tls: false,
            settings: HarnessSettings::default(),
        }
    }
}

impl ClusterConfig {
    pub fn new(
        size: usize,
        root_dir: impl Into<PathBuf>,
        root_port: u16,
    ) -> Self {
        Self {
            size,
            root_dir: root_dir.into(),
            root_port,
            ..Default::default()
        }
    }

    /// Validates cluster configuration consistency
    /// # Errors
    /// Returns `Error::Config` if any configuration rules are violated
    pub fn validate(&self) -> Result<()> {
        if self.size == 0 {
            return Err(Error::config("cluster size must be >= 1"));
        }

        if self.root_dir.as_os_str().is_empty() {
            return Err(Error::config("root_dir cannot be empty"));
        }

        if self.root_port == 0 {
            return Err(Error::config("root_port must be non-zero"));
        }

        let last_port = ports_per_cluster(self.size)
            .and_then(|span| (self.root_port as usize).checked_add(span - 1))
            .filter(|last| *last <= u16::MAX as usize);
        if last_port.is_none() {
            return Err(Error::config(format!(
                "root_port {} leaves no room for {} nodes",
                self.root_port, self.size
            )));
        }

        if self.peer_auto_tls && !self.peer_tls_info.is_empty() {
            return Err(Error::config(
                "peer_auto_tls and peer_tls_info are mutually exclusive",
            ));
        }
        if self.client_auto_tls && !self.client_tls_info.is_empty() {
            return Err(Error::config(
                "client_auto_tls and client_tls_info are mutually exclusive",
            ));
        }

        self.settings.validate()
    }

    /// Whether clients must speak TLS to this cluster.
    pub fn client_tls_enabled(&self) -> bool {
        self.client_auto_tls || !self.client_tls_info.is_empty()
    }

    pub fn peer_tls_enabled(&self) -> bool {
        self.peer_auto_tls || !self.peer_tls_info.is_empty()
    }
}

fn default_root_port() -> u16 {
    21300
}
