//! The Cluster Orchestrator.
//!
//! A [`Cluster`] owns exactly `size` node slots for its whole lifetime. Slots
//! are addressed by index; a stopped node keeps its slot, its config and its
//! TLS identity so it can be restarted into the same logical cluster.
//!
//! ## Example
//! ```rust,no_run
//! # async fn demo() -> d_engine_harness::Result<()> {
//! use d_engine_harness::{Cluster, ClusterConfig};
//!
//! let cluster = Cluster::start(ClusterConfig::new(3, "/tmp/c1", 21300)).await?;
//! let endpoints = cluster.all_endpoints(true).await;
//! cluster.stop(0).await?;
//! cluster.restart(0).await?;
//! cluster.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use futures::future::join_all;
use futures::future::try_join_all;
use nanoid::nanoid;
use tokio::sync::Mutex;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::constants::LOCALHOST;
use crate::node_name;
use crate::node_ports;
use crate::poll_until_ready;
use crate::ClusterConfig;
use crate::ClusterLayout;
use crate::CommandLauncher;
use crate::Error;
use crate::Launcher;
use crate::ListenerConfig;
use crate::ListenerProbe;
use crate::Node;
use crate::NodeConfig;
use crate::NodePorts;
use crate::NodeState;
use crate::PeerSpec;
use crate::Provisioned;
use crate::ReadinessProbe;
use crate::Result;
use crate::StopOutcome;
use crate::TlsInfo;
use crate::TlsMode;
use crate::TlsProvisioner;
use crate::TlsRole;

pub struct Cluster {
    config: ClusterConfig,
    layout: ClusterLayout,
    token: String,
    node_configs: Vec<NodeConfig>,
    nodes: Vec<NodeSlot>,
    peer_tls: Option<TlsInfo>,
    client_tls: Option<TlsInfo>,
}

/// A node plus a copy of its last settled state, readable without waiting
/// for a transition in flight on the node itself.
struct NodeSlot {
    node: Mutex<Node>,
    state: AtomicU8,
}

const NODE_STATES: [NodeState; 4] = [
    NodeState::Unstarted,
    NodeState::Running,
    NodeState::Stopped,
    NodeState::Terminated,
];

impl NodeSlot {
    fn new(node: Node) -> Self {
        let state = AtomicU8::new(node.state() as u8);
        Self {
            node: Mutex::new(node),
            state,
        }
    }

    fn state(&self) -> NodeState {
        let raw = self.state.load(Ordering::Acquire) as usize;
        NODE_STATES.get(raw).copied().unwrap_or(NodeState::Terminated)
    }

    fn publish(
        &self,
        node: &Node,
    ) {
        self.state.store(node.state() as u8, Ordering::Release);
    }
}

impl std::fmt::Debug for Cluster {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("size", &self.size())
            .field("root_dir", &self.layout.root())
            .field("token", &self.token)
            .finish()
    }
}

impl Cluster {
    /// Starts a cluster of real node processes, confirmed by
    /// [`ListenerProbe`].
    pub async fn start(config: ClusterConfig) -> Result<Self> {
        let layout = ClusterLayout::new(&config.root_dir);
        let launcher = CommandLauncher::new(config.settings.node.clone(), layout);
        Self::start_with(config, Arc::new(launcher), Arc::new(ListenerProbe)).await
    }

    /// Starts a cluster with injected process and readiness seams.
    ///
    /// Fails atomically: when any node cannot be set up, every node that did
    /// come up is terminated before the error is returned.
    pub async fn start_with(
        config: ClusterConfig,
        launcher: Arc<dyn Launcher>,
        probe: Arc<dyn ReadinessProbe>,
    ) -> Result<Self> {
        config.validate()?;

        let layout = ClusterLayout::new(&config.root_dir);
        tokio::fs::create_dir_all(layout.root()).await?;

        let ports = (0..config.size)
            .map(|index| node_ports(config.root_port, index))
            .collect::<Result<Vec<_>>>()?;

        let peer_tls = provision(
            TlsRole::Peer,
            &config.peer_tls_info,
            config.peer_auto_tls,
            layout.root(),
            &ports,
        )?;
        let client_tls = provision(
            TlsRole::Client,
            &config.client_tls_info,
            config.client_auto_tls,
            layout.root(),
            &ports,
        )?;

        let token = nanoid!();
        let node_configs = build_node_configs(&layout, &token, &ports, &peer_tls, &client_tls);
        for node_config in &node_configs {
            node_config.write_to(&layout.config_file(node_config.index))?;
        }

        let mut nodes: Vec<Node> = node_configs
            .iter()
            .map(|c| {
                Node::new(
                    c.clone(),
                    launcher.clone(),
                    probe.clone(),
                    config.settings.lifecycle,
                )
            })
            .collect();

        // Nodes may come up in any order; convergence is the store's concern.
        let results = join_all(nodes.iter_mut().map(|node| node.start())).await;
        if let Some(e) = results.into_iter().find_map(|r| r.err()) {
            error!(root_dir = %layout.root().display(), "cluster start failed: {}", e);
            for node in &mut nodes {
                if let Err(unwind) = node.terminate().await {
                    error!(index = node.index(), "failed to unwind node: {}", unwind);
                }
            }
            return Err(e);
        }

        info!(
            size = config.size,
            root_port = config.root_port,
            token = %token,
            peer_tls = peer_tls.consumer.is_some(),
            client_tls = client_tls.consumer.is_some(),
            "cluster started"
        );

        Ok(Self {
            layout,
            token,
            node_configs,
            nodes: nodes.into_iter().map(NodeSlot::new).collect(),
            peer_tls: peer_tls.consumer,
            client_tls: client_tls.consumer,
            config,
        })
    }

    pub fn size(&self) -> usize {
        self.nodes.len()
    }

    pub fn root_dir(&self) -> &Path {
        self.layout.root()
    }

    pub fn layout(&self) -> &ClusterLayout {
        &self.layout
    }

    /// Cluster identity shared by every node of this instance.
    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Client endpoints of every running node, in index order.
    ///
    /// With `use_scheme` each address carries `https://` or `http://`
    /// depending on whether the client transport uses TLS. A node whose
    /// stop or restart is still in flight is reported in its previous state.
    pub async fn all_endpoints(
        &self,
        use_scheme: bool,
    ) -> Vec<String> {
        self.running()
            .map(|node_config| node_config.client_endpoint(use_scheme))
            .collect()
    }

    /// Peer URLs of every member, running or not, in index order.
    pub fn peer_urls(&self) -> Vec<String> {
        self.node_configs.iter().map(|c| c.peer.advertise_url.clone()).collect()
    }

    pub fn node_config(
        &self,
        index: usize,
    ) -> Result<&NodeConfig> {
        self.check_index(index)?;
        Ok(&self.node_configs[index])
    }

    pub async fn node_state(
        &self,
        index: usize,
    ) -> Result<NodeState> {
        Ok(self.slot(index)?.state())
    }

    pub async fn node_pid(
        &self,
        index: usize,
    ) -> Result<Option<u32>> {
        Ok(self.slot(index)?.node.lock().await.pid())
    }

    /// TLS bundle a client needs to talk to the cluster: the CA to trust and,
    /// for mutual TLS, the certificate and key to present. `None` when the
    /// client transport is plaintext.
    pub fn client_tls_info(&self) -> Option<&TlsInfo> {
        self.client_tls.as_ref()
    }

    /// Same as [`Cluster::client_tls_info`] for the peer transport.
    pub fn peer_tls_info(&self) -> Option<&TlsInfo> {
        self.peer_tls.as_ref()
    }

    /// Gracefully stops node `index`, keeping its data directory.
    pub async fn stop(
        &self,
        index: usize,
    ) -> Result<StopOutcome> {
        let slot = self.slot(index)?;
        let mut node = slot.node.lock().await;
        let result = node.stop().await;
        slot.publish(&node);

        let outcome = result?;
        if outcome == StopOutcome::Killed {
            warn!(index, "node had to be killed");
        }
        Ok(outcome)
    }

    /// Relaunches a stopped node with its original config, data directory and
    /// TLS material.
    pub async fn restart(
        &self,
        index: usize,
    ) -> Result<()> {
        let slot = self.slot(index)?;
        let mut node = slot.node.lock().await;
        let result = node.restart().await;
        slot.publish(&node);

        result?;
        info!(index, "node restarted");
        Ok(())
    }

    /// Polls `probe` against every running node until all of them confirm,
    /// bounded by the readiness policy of the harness settings.
    pub async fn wait_ready(
        &self,
        probe: &dyn ReadinessProbe,
    ) -> Result<()> {
        let policy = self.config.settings.readiness;
        try_join_all(self.running().map(|c| poll_until_ready(probe, c, &policy))).await?;
        Ok(())
    }

    /// Terminates every node regardless of its state. Data directories are
    /// left in place.
    ///
    /// Calling it again only retries the nodes that did not come down the
    /// first time; a fully terminated cluster shuts down as a no-op.
    pub async fn shutdown(&self) -> Result<()> {
        let results = join_all(self.nodes.iter().map(|slot| async move {
            let mut node = slot.node.lock().await;
            let result = node.terminate().await;
            slot.publish(&node);
            result
        }))
        .await;

        let mut first_error = None;
        for (index, result) in results.into_iter().enumerate() {
            if let Err(e) = result {
                error!(index, "failed to terminate node: {}", e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => {
                info!(root_dir = %self.layout.root().display(), "cluster shut down");
                Ok(())
            }
        }
    }

    fn check_index(
        &self,
        index: usize,
    ) -> Result<()> {
        if index >= self.size() {
            return Err(Error::Index {
                index,
                size: self.size(),
            });
        }
        Ok(())
    }

    fn slot(
        &self,
        index: usize,
    ) -> Result<&NodeSlot> {
        self.check_index(index)?;
        Ok(&self.nodes[index])
    }

    fn running(&self) -> impl Iterator<Item = &NodeConfig> {
        self.nodes
            .iter()
            .zip(&self.node_configs)
            .filter(|(slot, _)| slot.state() == NodeState::Running)
            .map(|(_, node_config)| node_config)
    }
}

fn provision(
    role: TlsRole,
    manual: &TlsInfo,
    auto: bool,
    root: &Path,
    ports: &[NodePorts],
) -> Result<Provisioned> {
    let mode = TlsMode::resolve(role, manual, auto)?;
    let hosts: Vec<Vec<String>> = ports
        .iter()
        .map(|_| vec!["localhost".to_string(), LOCALHOST.to_string()])
        .collect();
    TlsProvisioner::new(role, mode, root).provision(&hosts)
}

fn build_node_configs(
    layout: &ClusterLayout,
    token: &str,
    ports: &[NodePorts],
    peer_tls: &Provisioned,
    client_tls: &Provisioned,
) -> Vec<NodeConfig> {
    let peers: Vec<ListenerConfig> = ports
        .iter()
        .zip(&peer_tls.nodes)
        .map(|(p, tls)| ListenerConfig::new(p.peer_addr(), tls.clone()))
        .collect();

    let members: Vec<PeerSpec> = peers
        .iter()
        .enumerate()
        .map(|(index, listener)| PeerSpec {
            index,
            name: node_name(index),
            peer_url: listener.advertise_url.clone(),
        })
        .collect();

    peers
        .into_iter()
        .zip(ports.iter().zip(&client_tls.nodes))
        .enumerate()
        .map(|(index, (peer, (p, client_tls)))| NodeConfig {
            index,
            name: node_name(index),
            cluster_token: token.to_string(),
            data_dir: layout.data_dir(index),
            log_file: layout.log_file(index),
            peer,
            client: ListenerConfig::new(p.client_addr(), client_tls.clone()),
            peers: members.clone(),
        })
        .collect()
}
