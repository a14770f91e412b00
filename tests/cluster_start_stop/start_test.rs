use d_engine_harness::Cluster;
use tempfile::tempdir;
use tracing_test::traced_test;

use crate::common::apply_tls_case;
use crate::common::cluster_config;
use crate::common::shutdown_and_verify;
use crate::common::HealthProbe;
use crate::common::KvClient;
use crate::common::TlsCase;

/// Starts a 3-node cluster, writes `foo=bar` and reads it back from every
/// endpoint.
async fn start_write_read(
    case: TlsCase,
    use_scheme: bool,
) {
    let dir = tempdir().unwrap();
    let mut config = cluster_config(3, dir.path());
    apply_tls_case(&mut config, case, dir.path());

    let cluster = Cluster::start(config).await.unwrap();
    cluster.wait_ready(&HealthProbe::new(&cluster)).await.unwrap();

    let endpoints = cluster.all_endpoints(use_scheme).await;
    assert_eq!(endpoints.len(), 3);
    let expected_scheme = if cluster.client_tls_info().is_some() { "https://" } else { "http://" };
    for endpoint in &endpoints {
        assert_eq!(endpoint.starts_with(expected_scheme), use_scheme, "endpoint {endpoint}");
    }

    let client = KvClient::connect(&cluster, use_scheme).await;
    client.put("foo", "bar").await.unwrap();
    assert_eq!(client.get("foo").await.unwrap().as_deref(), Some("bar"));

    shutdown_and_verify(&cluster).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_start_without_tls() {
    start_write_read(TlsCase::None, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_start_with_peer_manual_tls() {
    start_write_read(TlsCase::PeerManual, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_start_with_peer_auto_tls() {
    start_write_read(TlsCase::PeerAuto, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_start_with_client_manual_tls() {
    start_write_read(TlsCase::ClientManual, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_start_with_client_manual_tls_and_scheme() {
    start_write_read(TlsCase::ClientManual, true).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_start_with_client_auto_tls() {
    start_write_read(TlsCase::ClientAuto, false).await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn test_start_with_client_auto_tls_and_scheme() {
    start_write_read(TlsCase::ClientAuto, true).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_start_with_both_transports_secured() {
    let dir = tempdir().unwrap();
    let mut config = cluster_config(3, dir.path());
    apply_tls_case(&mut config, TlsCase::PeerAuto, dir.path());
    apply_tls_case(&mut config, TlsCase::ClientManual, dir.path());

    let cluster = Cluster::start(config).await.unwrap();
    cluster.wait_ready(&HealthProbe::new(&cluster)).await.unwrap();

    let client = KvClient::connect(&cluster, true).await;
    client.put("foo", "bar").await.unwrap();
    assert_eq!(client.get("foo").await.unwrap().as_deref(), Some("bar"));

    shutdown_and_verify(&cluster).await;
}
