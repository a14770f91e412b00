use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::path::PathBuf;

use config::Config;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::NODE_ENV_PREFIX;
use crate::utils::file_io::create_parent_dir_if_not_exist;
use crate::utils::net::address_str;
use crate::utils::net::strip_scheme;
use crate::LaunchError;
use crate::Result;
use crate::TlsInfo;

/// One listener of a node (peer or client transport).
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Address the node binds
    pub listen_addr: SocketAddr,

    /// URL other parties use to reach this listener, scheme included
    pub advertise_url: String,

    /// TLS bundle; `None` means plaintext. On the peer transport the same
    /// certificate doubles as client identity when dialing other peers.
    #[serde(default)]
    pub tls: Option<TlsInfo>,
}

impl ListenerConfig {
    pub fn new(
        listen_addr: SocketAddr,
        tls: Option<TlsInfo>,
    ) -> Self {
        Self {
            listen_addr,
            advertise_url: address_str(&listen_addr.to_string(), tls.is_some()),
            tls,
        }
    }

    pub fn tls_enabled(&self) -> bool {
        self.tls.is_some()
    }
}

/// How a node reaches one member of its cluster over the peer transport.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PeerSpec {
    pub index: usize,
    pub name: String,
    pub peer_url: String,
}

/// Everything a store node needs to join its cluster.
///
/// Rendered once at cluster start and reused unchanged on every restart, so
/// the node keeps its data directory, peer list and TLS identity.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct NodeConfig {
    /// Position within the cluster
    pub index: usize,

    pub name: String,

    /// Identity shared by every member of one cluster instance
    pub cluster_token: String,

    /// Persisted store data, owned exclusively by this node while running
    pub data_dir: PathBuf,

    /// Tracing output of the node process
    pub log_file: PathBuf,

    pub peer: ListenerConfig,

    pub client: ListenerConfig,

    /// Full membership, this node included, in index order
    pub peers: Vec<PeerSpec>,
}

impl NodeConfig {
    /// Loads a rendered config, letting `NODE__*` environment variables
    /// override individual fields.
    pub fn load(path: &Path) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(
                Environment::with_prefix(NODE_ENV_PREFIX)
                    .separator("__")
                    .ignore_empty(true)
                    .try_parsing(true),
            )
            .build()?;
        Ok(config.try_deserialize()?)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|source| {
            LaunchError::RenderConfig {
                index: self.index,
                source,
            }
            .into()
        })
    }

    /// Renders the config to `path`, creating parent directories.
    pub fn write_to(
        &self,
        path: &Path,
    ) -> Result<()> {
        let content = self.to_toml()?;
        create_parent_dir_if_not_exist(path)
            .and_then(|_| fs::write(path, content))
            .map_err(|source| {
                LaunchError::WriteConfig {
                    index: self.index,
                    path: path.to_path_buf(),
                    source,
                }
                .into()
            })
    }

    /// Client-facing address, optionally prefixed with the scheme a client
    /// library expects.
    pub fn client_endpoint(
        &self,
        use_scheme: bool,
    ) -> String {
        if use_scheme {
            self.client.advertise_url.clone()
        } else {
            strip_scheme(&self.client.advertise_url).to_string()
        }
    }

    /// Every other member of the cluster.
    pub fn other_peers(&self) -> impl Iterator<Item = &PeerSpec> {
        let index = self.index;
        self.peers.iter().filter(move |p| p.index != index)
    }

    pub fn cluster_size(&self) -> usize {
        self.peers.len()
    }
}
