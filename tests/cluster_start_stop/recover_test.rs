use d_engine_harness::Cluster;
use d_engine_harness::NodeState;
use tempfile::tempdir;
use tracing_test::traced_test;

use crate::common::apply_tls_case;
use crate::common::cluster_config;
use crate::common::shutdown_and_verify;
use crate::common::HealthProbe;
use crate::common::KvClient;
use crate::common::TlsCase;

/// Writes `foo=bar`, stops and restarts every node in turn, and expects the
/// value unchanged after each cycle.
async fn write_stop_restart_read(
    case: TlsCase,
    use_scheme: bool,
) {
    let dir = tempdir().unwrap();
    let mut config = cluster_config(3, dir.path());
    apply_tls_case(&mut config, case, dir.path());

    let cluster = Cluster::start(config).await.unwrap();
    let probe = HealthProbe::new(&cluster);
    cluster.wait_ready(&probe).await.unwrap();

    KvClient::connect(&cluster, use_scheme).await.put("foo", "bar").await.unwrap();

    for index in 0..cluster.size() {
        let pid_before = cluster.node_pid(index).await.unwrap();
        cluster.stop(index).await.unwrap();
        assert_eq!(cluster.node_state(index).await.unwrap(), NodeState::Stopped);
        assert_eq!(cluster.all_endpoints(use_scheme).await.len(), 2);

        cluster.restart(index).await.unwrap();
        cluster.wait_ready(&probe).await.unwrap();
        assert_ne!(cluster.node_pid(index).await.unwrap(), pid_before);

        let client = KvClient::connect(&cluster, use_scheme).await;
        assert_eq!(client.endpoints().len(), 3);
        assert_eq!(client.get("foo").await.unwrap().as_deref(), Some("bar"));
    }

    shutdown_and_verify(&cluster).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_recover_without_tls() {
    write_stop_restart_read(TlsCase::None, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_recover_with_peer_manual_tls() {
    write_stop_restart_read(TlsCase::PeerManual, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_recover_with_peer_auto_tls() {
    write_stop_restart_read(TlsCase::PeerAuto, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_recover_with_client_manual_tls() {
    write_stop_restart_read(TlsCase::ClientManual, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_recover_with_client_manual_tls_and_scheme() {
    write_stop_restart_read(TlsCase::ClientManual, true).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_recover_with_client_auto_tls() {
    write_stop_restart_read(TlsCase::ClientAuto, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_recover_with_client_auto_tls_and_scheme() {
    write_stop_restart_read(TlsCase::ClientAuto, true).await;
}

/// A node that was down while a write committed sees it after restart.
#[tokio::test(flavor = "multi_thread")]
async fn test_write_while_node_down_is_visible_after_restart() {
    let dir = tempdir().unwrap();
    let mut config = cluster_config(3, dir.path());
    apply_tls_case(&mut config, TlsCase::PeerAuto, dir.path());

    let cluster = Cluster::start(config).await.unwrap();
    let probe = HealthProbe::new(&cluster);
    cluster.wait_ready(&probe).await.unwrap();

    cluster.stop(0).await.unwrap();
    KvClient::connect(&cluster, true).await.put("foo", "bar").await.unwrap();

    cluster.restart(0).await.unwrap();
    cluster.wait_ready(&probe).await.unwrap();

    let client = KvClient::connect(&cluster, true).await;
    let restarted = cluster.node_config(0).unwrap().client_endpoint(true);
    assert_eq!(client.get_from(&restarted, "foo").await.unwrap().as_deref(), Some("bar"));

    shutdown_and_verify(&cluster).await;
}
