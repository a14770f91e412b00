use std::fs;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use d_engine_harness::http_client;
use d_engine_harness::Cluster;
use d_engine_harness::ClusterConfig;
use d_engine_harness::HarnessSettings;
use d_engine_harness::NodeConfig;
use d_engine_harness::PortAllocator;
use d_engine_harness::ReadinessProbe;
use d_engine_harness::TlsInfo;
use d_engine_harness::HTTPS_SCHEME;
use d_engine_harness::HTTP_SCHEME;
use nix::sys::signal::kill;
use nix::unistd::Pid;
use once_cell::sync::Lazy;
use rcgen::BasicConstraints;
use rcgen::CertificateParams;
use rcgen::DnType;
use rcgen::ExtendedKeyUsagePurpose;
use rcgen::IsCa;
use rcgen::KeyPair;
use rcgen::KeyUsagePurpose;
use tracing::debug;

pub const CLIENT_TIMEOUT: Duration = Duration::from_secs(3);

/// One allocator for every test in this binary, so clusters started by
/// concurrently running tests never share a port.
pub static PORTS: Lazy<PortAllocator> = Lazy::new(|| PortAllocator::new(24000, 20));

/// Harness settings pointing at the node binary built with this crate.
pub fn settings() -> HarnessSettings {
    let mut settings =
        HarnessSettings::default().with_program(env!("CARGO_BIN_EXE_d-engine-harness"));
    settings.node.log_level = "info,d_engine_harness=debug".to_string();
    settings
}

pub fn cluster_config(
    size: usize,
    root: &Path,
) -> ClusterConfig {
    let root_port = PORTS.next_root_port(size).unwrap();
    let mut config = ClusterConfig::new(size, root, root_port);
    config.settings = settings();
    config
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TlsCase {
    None,
    PeerManual,
    PeerAuto,
    ClientManual,
    ClientAuto,
}

/// Applies one transport security combination to `config`. Manual fixtures
/// are written under `root/fixtures`.
pub fn apply_tls_case(
    config: &mut ClusterConfig,
    case: TlsCase,
    root: &Path,
) {
    match case {
        TlsCase::None => {}
        TlsCase::PeerManual => {
            config.peer_tls_info = manual_tls(&root.join("fixtures/peer"), true);
        }
        TlsCase::PeerAuto => config.peer_auto_tls = true,
        TlsCase::ClientManual => {
            config.client_tls_info = manual_tls(&root.join("fixtures/client"), true);
        }
        TlsCase::ClientAuto => config.client_auto_tls = true,
    }
}

/// CA plus one certificate valid for `localhost` and `127.0.0.1`, usable as
/// both server and client identity, the way an operator would prepare a
/// manual bundle.
pub fn manual_tls(
    dir: &Path,
    client_cert_auth: bool,
) -> TlsInfo {
    fs::create_dir_all(dir).unwrap();

    let mut ca_params = CertificateParams::new(Vec::<String>::new()).unwrap();
    ca_params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    ca_params.distinguished_name.push(DnType::CommonName, "manual test CA");
    ca_params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let ca_key = KeyPair::generate().unwrap();
    let ca = ca_params.self_signed(&ca_key).unwrap();

    let mut params =
        CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
    params.distinguished_name.push(DnType::CommonName, "manual test node");
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ServerAuth,
        ExtendedKeyUsagePurpose::ClientAuth,
    ];
    let key = KeyPair::generate().unwrap();
    let cert = params.signed_by(&key, &ca, &ca_key).unwrap();

    let ca_file = dir.join("ca.pem");
    let cert_file = dir.join("server.pem");
    let key_file = dir.join("server-key.pem");
    fs::write(&ca_file, ca.pem()).unwrap();
    fs::write(&cert_file, cert.pem()).unwrap();
    fs::write(&key_file, key.serialize_pem()).unwrap();

    TlsInfo::new(cert_file, key_file, ca_file, client_cert_auth)
}

/// Ready once the node answers `GET /health` on its client listener.
pub struct HealthProbe {
    client: reqwest::Client,
}

impl HealthProbe {
    pub fn new(cluster: &Cluster) -> Self {
        Self {
            client: http_client(cluster.client_tls_info(), CLIENT_TIMEOUT).unwrap(),
        }
    }
}

#[async_trait]
impl ReadinessProbe for HealthProbe {
    async fn is_ready(
        &self,
        node: &NodeConfig,
    ) -> bool {
        let url = format!("{}/health", node.client.advertise_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!(index = node.index, "health check failed: {}", e);
                false
            }
        }
    }
}

/// Stand-in for a store client library: takes the endpoint list handed out
/// by the harness, with or without scheme, plus the consumer TLS bundle.
pub struct KvClient {
    client: reqwest::Client,
    endpoints: Vec<String>,
}

impl KvClient {
    pub fn new(
        endpoints: Vec<String>,
        tls: Option<&TlsInfo>,
    ) -> Self {
        let scheme = if tls.is_some() { HTTPS_SCHEME } else { HTTP_SCHEME };
        let endpoints = endpoints
            .into_iter()
            .map(|e| if e.contains("://") { e } else { format!("{scheme}{e}") })
            .collect();
        Self {
            client: http_client(tls, CLIENT_TIMEOUT).unwrap(),
            endpoints,
        }
    }

    pub async fn connect(
        cluster: &Cluster,
        use_scheme: bool,
    ) -> Self {
        Self::new(cluster.all_endpoints(use_scheme).await, cluster.client_tls_info())
    }

    pub fn endpoints(&self) -> &[String] {
        &self.endpoints
    }

    /// Writes through the first endpoint that accepts the write.
    pub async fn put(
        &self,
        key: &str,
        value: &str,
    ) -> Result<(), String> {
        let mut last_error = String::from("no endpoints");
        for endpoint in &self.endpoints {
            let url = format!("{endpoint}/v1/kv/{key}");
            match self.client.put(&url).body(value.to_string()).send().await {
                Ok(response) if response.status().is_success() => return Ok(()),
                Ok(response) => last_error = format!("{endpoint}: {}", response.status()),
                Err(e) => last_error = format!("{endpoint}: {e}"),
            }
        }
        Err(last_error)
    }

    /// Reads `key` from one endpoint.
    pub async fn get_from(
        &self,
        endpoint: &str,
        key: &str,
    ) -> Result<Option<String>, String> {
        let url = format!("{endpoint}/v1/kv/{key}");
        let response = self.client.get(&url).send().await.map_err(|e| e.to_string())?;
        match response.status() {
            reqwest::StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => {
                response.text().await.map(Some).map_err(|e| e.to_string())
            }
            status => Err(format!("{endpoint}: {status}")),
        }
    }

    /// Reads `key` from every endpoint; all must agree.
    pub async fn get(
        &self,
        key: &str,
    ) -> Result<Option<String>, String> {
        let mut values = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            values.push(self.get_from(endpoint, key).await?);
        }
        values.dedup();
        match values.len() {
            1 => Ok(values.remove(0)),
            _ => Err(format!("endpoints disagree on {key}: {values:?}")),
        }
    }
}

/// Shuts the cluster down and checks every node process is gone.
pub async fn shutdown_and_verify(cluster: &Cluster) {
    let mut pids = Vec::new();
    for index in 0..cluster.size() {
        if let Some(pid) = cluster.node_pid(index).await.unwrap() {
            pids.push(pid);
        }
    }

    cluster.shutdown().await.unwrap();

    for pid in pids {
        assert!(kill(Pid::from_raw(pid as i32), None).is_err(), "node process {pid} still alive");
    }
}
