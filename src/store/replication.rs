use std::time::Duration;

use futures::future::join_all;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::Entry;
use super::KvStore;
use super::Snapshot;
use crate::http_client;
use crate::NodeConfig;
use crate::PeerSpec;
use crate::Result;

const PEER_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);

pub(crate) const PEER_KV_PATH: &str = "peer/v1/kv";
pub(crate) const PEER_SNAPSHOT_PATH: &str = "peer/v1/snapshot";

/// Pushes writes to, and pulls snapshots from, the other members over the
/// peer transport.
#[derive(Debug)]
pub struct Replicator {
    peers: Vec<PeerSpec>,
    client: reqwest::Client,
}

impl Replicator {
    /// Peers are dialed with this node's own peer certificate as client
    /// identity, so mutual TLS between peers works out of the box.
    pub fn new(config: &NodeConfig) -> Result<Self> {
        Ok(Self {
            peers: config.other_peers().cloned().collect(),
            client: http_client(config.peer.tls.as_ref(), PEER_REQUEST_TIMEOUT)?,
        })
    }

    /// Sends `entry` to every other member; returns how many acknowledged.
    pub async fn replicate(
        &self,
        key: &str,
        entry: &Entry,
    ) -> usize {
        let requests = self.peers.iter().map(|peer| async move {
            let url = format!("{}/{}/{}", peer.peer_url, PEER_KV_PATH, key);
            match self.client.put(&url).json(entry).send().await {
                Ok(response) if response.status().is_success() => true,
                Ok(response) => {
                    warn!(peer = peer.index, status = %response.status(), "peer rejected write");
                    false
                }
                Err(e) => {
                    debug!(peer = peer.index, "peer unreachable: {}", e);
                    false
                }
            }
        });

        join_all(requests).await.into_iter().filter(|acked| *acked).count()
    }

    /// Merges the snapshot of every reachable peer into `store`.
    ///
    /// Unreachable peers are skipped; on a cold cluster start nobody is
    /// listening yet and there is nothing to catch up on.
    pub async fn catch_up(
        &self,
        store: &KvStore,
    ) -> Result<usize> {
        let snapshots = join_all(self.peers.iter().map(|peer| self.fetch_snapshot(peer))).await;

        let mut changed = 0;
        for snapshot in snapshots.into_iter().flatten() {
            changed += store.merge_snapshot(snapshot)?;
        }
        info!(changed, "caught up from peers");
        Ok(changed)
    }

    async fn fetch_snapshot(
        &self,
        peer: &PeerSpec,
    ) -> Option<Snapshot> {
        let url = format!("{}/{}", peer.peer_url, PEER_SNAPSHOT_PATH);
        let response = match self.client.get(&url).send().await {
            Ok(response) => response,
            Err(e) => {
                debug!(peer = peer.index, "snapshot unavailable: {}", e);
                return None;
            }
        };
        match response.error_for_status() {
            Ok(response) => match response.json::<Snapshot>().await {
                Ok(snapshot) => Some(snapshot),
                Err(e) => {
                    warn!(peer = peer.index, "malformed snapshot: {}", e);
                    None
                }
            },
            Err(e) => {
                warn!(peer = peer.index, "snapshot request failed: {}", e);
                None
            }
        }
    }
}
