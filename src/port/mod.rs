//! Port allocation for local clusters.
//!
//! Within one cluster, ports are a pure function of `root_port` and the node
//! index. Across clusters, a [`PortAllocator`] hands out non-overlapping
//! `root_port` values; it replaces a global counter and is meant to be owned
//! by the test driver and shared by reference.


use std::net::SocketAddr;

use parking_lot::Mutex;
use tracing::debug;

use crate::constants::LOCALHOST;
use crate::Error;
use crate::Result;

/// Every node reserves a peer port and a client port.
pub const PORTS_PER_NODE: usize = 2;

const PEER_PORT_OFFSET: usize = 0;
const CLIENT_PORT_OFFSET: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePorts {
    pub peer: u16,
    pub client: u16,
}

impl NodePorts {
    pub fn peer_addr(&self) -> SocketAddr {
        SocketAddr::from((LOCALHOST, self.peer))
    }

    pub fn client_addr(&self) -> SocketAddr {
        SocketAddr::from((LOCALHOST, self.client))
    }
}

/// Number of consecutive ports a cluster of `size` nodes occupies.
pub fn ports_per_cluster(size: usize) -> Option<usize> {
    size.checked_mul(PORTS_PER_NODE)
}

/// Peer and client port of node `index`.
///
/// Peer port is `root_port + 2*index`, client port is the one after it.
pub fn node_ports(
    root_port: u16,
    index: usize,
) -> Result<NodePorts> {
    let port_at = |offset: usize| -> Result<u16> {
        index
            .checked_mul(PORTS_PER_NODE)
            .and_then(|base| base.checked_add(offset))
            .and_then(|delta| (root_port as usize).checked_add(delta))
            .and_then(|port| u16::try_from(port).ok())
            .ok_or_else(|| {
                Error::config(format!(
                    "port for node {index} overflows from root_port {root_port}"
                ))
            })
    };

    Ok(NodePorts {
        peer: port_at(PEER_PORT_OFFSET)?,
        client: port_at(CLIENT_PORT_OFFSET)?,
    })
}

/// Hands out `root_port` values so concurrent clusters never share a port.
///
/// The critical section is limited to reading then advancing the cursor.
#[derive(Debug)]
pub struct PortAllocator {
    next: Mutex<u32>,
    stride: u16,
}

impl PortAllocator {
    /// `stride` is the minimum distance between two consecutive root ports.
    pub fn new(
        base: u16,
        stride: u16,
    ) -> Self {
        Self {
            next: Mutex::new(base as u32),
            stride,
        }
    }

    /// Reserves a port range for a cluster of `size` nodes and returns its
    /// `root_port`.
    pub fn next_root_port(
        &self,
        size: usize,
    ) -> Result<u16> {
        if size == 0 {
            return Err(Error::config("cluster size must be >= 1"));
        }
        let span = ports_per_cluster(size)
            .and_then(|span| u32::try_from(span).ok())
            .ok_or_else(|| Error::config(format!("cluster size {size} is too large")))?;
        let advance = span.max(self.stride as u32);

        let mut next = self.next.lock();
        let root = *next;
        if root == 0 || root + span - 1 > u16::MAX as u32 {
            return Err(Error::config(format!(
                "port range exhausted: cannot fit {size} nodes at {root}"
            )));
        }
        *next = root + advance;
        drop(next);

        debug!(root_port = root, size, "reserved cluster port range");
        Ok(root as u16)
    }
}

impl Default for PortAllocator {
    fn default() -> Self {
        Self::new(21300, 10)
    }
}
