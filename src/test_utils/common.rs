use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::ExitStatus;

use crate::node_name;
use crate::node_ports;
use crate::ClusterLayout;
use crate::ListenerConfig;
use crate::LifecycleTimeouts;
use crate::NodeConfig;
use crate::PeerSpec;

pub(crate) fn exit_status(code: i32) -> ExitStatus {
    ExitStatus::from_raw(code << 8)
}

pub(crate) fn killed_status() -> ExitStatus {
    // terminated by SIGKILL
    ExitStatus::from_raw(9)
}

/// Short timeouts so lifecycle tests finish quickly under paused time.
pub(crate) fn fast_timeouts() -> LifecycleTimeouts {
    LifecycleTimeouts {
        start_timeout_ms: 500,
        stop_grace_period_ms: 200,
        kill_timeout_ms: 100,
        probe_interval_ms: 10,
    }
}

/// Plaintext config of node `index` in a cluster of `size` under `root`.
pub(crate) fn node_config(
    index: usize,
    size: usize,
    root: &Path,
    root_port: u16,
) -> NodeConfig {
    let layout = ClusterLayout::new(root);
    let peers = (0..size)
        .map(|i| {
            let ports = node_ports(root_port, i).unwrap();
            PeerSpec {
                index: i,
                name: node_name(i),
                peer_url: format!("http://{}", ports.peer_addr()),
            }
        })
        .collect();
    let ports = node_ports(root_port, index).unwrap();

    NodeConfig {
        index,
        name: node_name(index),
        cluster_token: "test-cluster".to_string(),
        data_dir: layout.data_dir(index),
        log_file: layout.log_file(index),
        peer: ListenerConfig::new(ports.peer_addr(), None),
        client: ListenerConfig::new(ports.client_addr(), None),
        peers,
    }
}
