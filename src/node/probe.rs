use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use super::NodeConfig;
use crate::utils::async_task::poll_with_exponential_backoff;
use crate::utils::net::is_server_ready;
use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Readiness signal of one node.
///
/// The harness itself only needs to know that a node accepts connections;
/// callers that care about store level readiness (a leader elected, a
/// health endpoint answering) plug in their own probe.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ReadinessProbe: Send + Sync {
    async fn is_ready(
        &self,
        node: &NodeConfig,
    ) -> bool;
}

/// Ready once both the peer and the client listener accept TCP connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListenerProbe;

#[async_trait]
impl ReadinessProbe for ListenerProbe {
    async fn is_ready(
        &self,
        node: &NodeConfig,
    ) -> bool {
        is_server_ready(&node.peer.listen_addr.to_string()).await
            && is_server_ready(&node.client.listen_addr.to_string()).await
    }
}

/// Polls `probe` with exponential backoff until it confirms `node`, or fails
/// with [`Error::ConvergenceTimeout`] once the policy is exhausted.
pub async fn poll_until_ready(
    probe: &dyn ReadinessProbe,
    node: &NodeConfig,
    policy: &BackoffPolicy,
) -> Result<()> {
    if poll_with_exponential_backoff(|| probe.is_ready(node), policy).await {
        Ok(())
    } else {
        Err(Error::ConvergenceTimeout {
            index: node.index,
            timeout: policy.budget(),
        })
    }
}
