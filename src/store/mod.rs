//! Minimal replicated key-value node used to exercise the harness end to end.
//!
//! Writes are applied locally, pushed to every peer and acknowledged once a
//! majority holds them. A restarted node pulls peer snapshots before it
//! starts serving, so data written while it was down is visible again.

mod kv;
mod member;
mod replication;
mod server;

pub use kv::*;
pub use member::*;
pub use replication::*;
pub use server::*;


use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio_rustls::TlsAcceptor;
use tracing::info;

use crate::server_config;
use crate::NodeConfig;
use crate::Result;
use crate::StoreError;
use crate::TlsInfo;

/// Runs one store node until `shutdown` fires.
pub async fn run(
    config: NodeConfig,
    shutdown: watch::Receiver<()>,
) -> Result<()> {
    claim_data_dir(&config.data_dir, &MemberIdentity::of(&config))?;

    let store = Arc::new(KvStore::open(&config.data_dir)?);
    let replicator = Replicator::new(&config)?;
    replicator.catch_up(&store).await?;

    let peer_listener = bind(config.peer.listen_addr).await?;
    let client_listener = bind(config.client.listen_addr).await?;
    let peer_tls = acceptor(config.peer.tls.as_ref())?;
    let client_tls = acceptor(config.client.tls.as_ref())?;

    let ctx = Arc::new(StoreContext {
        index: config.index,
        name: config.name.clone(),
        cluster_token: config.cluster_token.clone(),
        cluster_size: config.cluster_size(),
        store: store.clone(),
        replicator,
    });

    info!(name = %config.name, keys = store.len(), "store node ready");
    tokio::join!(
        serve("peer", peer_listener, peer_tls, peer_routes(store), shutdown.clone()),
        serve("client", client_listener, client_tls, client_routes(ctx), shutdown),
    );

    info!(name = %config.name, "store node stopped");
    Ok(())
}

async fn bind(addr: SocketAddr) -> Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| StoreError::Bind { addr, source }.into())
}

fn acceptor(tls: Option<&TlsInfo>) -> Result<Option<TlsAcceptor>> {
    tls.map(|info| server_config(info).map(TlsAcceptor::from)).transpose()
}
