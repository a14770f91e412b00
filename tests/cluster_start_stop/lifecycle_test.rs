use d_engine_harness::Cluster;
use d_engine_harness::Error;
use d_engine_harness::LaunchError;
use d_engine_harness::LifecycleError;
use d_engine_harness::NodeState;
use d_engine_harness::StopOutcome;
use tempfile::tempdir;

use crate::common::cluster_config;
use crate::common::manual_tls;
use crate::common::shutdown_and_verify;
use crate::common::HealthProbe;
use crate::common::KvClient;

#[tokio::test(flavor = "multi_thread")]
async fn test_endpoint_count_matches_size() {
    for size in 1..=3 {
        let dir = tempdir().unwrap();
        let cluster = Cluster::start(cluster_config(size, dir.path())).await.unwrap();
        assert_eq!(cluster.all_endpoints(true).await.len(), size);
        assert_eq!(cluster.peer_urls().len(), size);
        shutdown_and_verify(&cluster).await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_out_of_range_index_leaves_cluster_alone() {
    let dir = tempdir().unwrap();
    let cluster = Cluster::start(cluster_config(3, dir.path())).await.unwrap();

    assert!(matches!(cluster.stop(3).await, Err(Error::Index { index: 3, size: 3 })));
    assert!(matches!(cluster.restart(42).await, Err(Error::Index { index: 42, size: 3 })));

    for index in 0..3 {
        assert_eq!(cluster.node_state(index).await.unwrap(), NodeState::Running);
    }
    assert_eq!(cluster.all_endpoints(false).await.len(), 3);

    shutdown_and_verify(&cluster).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_restart_of_running_node_is_rejected() {
    let dir = tempdir().unwrap();
    let cluster = Cluster::start(cluster_config(3, dir.path())).await.unwrap();
    let pid = cluster.node_pid(1).await.unwrap();

    let err = cluster.restart(1).await.unwrap_err();
    assert!(matches!(err, Error::Lifecycle(LifecycleError::InvalidTransition { index: 1, .. })));
    assert_eq!(cluster.node_pid(1).await.unwrap(), pid);

    shutdown_and_verify(&cluster).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_stop_is_graceful_and_keeps_data() {
    let dir = tempdir().unwrap();
    let cluster = Cluster::start(cluster_config(1, dir.path())).await.unwrap();
    cluster.wait_ready(&HealthProbe::new(&cluster)).await.unwrap();
    KvClient::connect(&cluster, true).await.put("foo", "bar").await.unwrap();

    assert_eq!(cluster.stop(0).await.unwrap(), StopOutcome::Graceful);
    assert!(cluster.all_endpoints(true).await.is_empty());

    let data_dir = &cluster.node_config(0).unwrap().data_dir;
    assert!(data_dir.join("kv.db").exists());
    assert!(cluster.layout().stderr_file(0).exists());

    shutdown_and_verify(&cluster).await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_shutdown_twice() {
    let dir = tempdir().unwrap();
    let cluster = Cluster::start(cluster_config(3, dir.path())).await.unwrap();
    cluster.stop(2).await.unwrap();

    shutdown_and_verify(&cluster).await;
    cluster.shutdown().await.unwrap();

    for index in 0..3 {
        assert_eq!(cluster.node_state(index).await.unwrap(), NodeState::Terminated);
    }
    // data directories stay for post-mortem inspection
    assert!(dir.path().join("node-0").is_dir());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_malformed_manual_tls_fails_before_any_node_starts() {
    let dir = tempdir().unwrap();
    let mut config = cluster_config(3, dir.path());
    let bundle = manual_tls(&dir.path().join("fixtures"), true);
    std::fs::write(bundle.key_file.as_ref().unwrap(), "not a key").unwrap();
    config.client_tls_info = bundle;

    let err = Cluster::start(config).await.unwrap_err();
    assert!(matches!(err, Error::Provisioning(_)), "unexpected error: {err:?}");
    assert!(!dir.path().join("conf").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_port_in_use_fails_atomically() {
    let dir = tempdir().unwrap();
    let config = cluster_config(3, dir.path());
    let busy = format!("127.0.0.1:{}", config.root_port + 5);
    let _listener = tokio::net::TcpListener::bind(&busy).await.unwrap();

    let err = Cluster::start(config).await.unwrap_err();
    assert!(
        matches!(err, Error::Launch(LaunchError::PortInUse { index: 2, .. })),
        "unexpected error: {err:?}"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_data_dir_of_another_cluster_is_refused() {
    let dir = tempdir().unwrap();
    let first = Cluster::start(cluster_config(1, dir.path())).await.unwrap();
    shutdown_and_verify(&first).await;

    // same root, fresh cluster identity
    let err = Cluster::start(cluster_config(1, dir.path())).await.unwrap_err();
    assert!(
        matches!(err, Error::Launch(LaunchError::Exited { index: 0, .. })),
        "unexpected error: {err:?}"
    );
    let stderr = std::fs::read_to_string(dir.path().join("logs/node-0.stderr")).unwrap();
    assert!(stderr.contains("refusing to start"), "stderr: {stderr}");
}
