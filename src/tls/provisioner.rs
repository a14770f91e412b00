use std::fs;
use std::path::Path;
use std::path::PathBuf;

use tracing::debug;
use tracing::info;

use super::server_config;
use super::CertificateAuthority;
use super::IssuedCertificate;
use crate::constants::CA_CERT_FILE;
use crate::constants::CONSUMER_NAME;
use crate::constants::TLS_DIR;
use crate::Error;
use crate::ProvisioningError;
use crate::Result;
use crate::TlsInfo;

/// The two independent trust domains of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TlsRole {
    Peer,
    Client,
}

impl TlsRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TlsRole::Peer => "peer",
            TlsRole::Client => "client",
        }
    }
}

impl std::fmt::Display for TlsRole {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How one transport role is secured.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TlsMode {
    /// Plaintext transport
    Disabled,
    /// Caller supplied bundle, shared by every node
    Manual(TlsInfo),
    /// Fresh CA per cluster, one leaf per node
    Auto,
}

impl TlsMode {
    /// Resolves the configured fields of one role. Setting both a manual
    /// bundle and the auto flag is a configuration error.
    pub fn resolve(
        role: TlsRole,
        manual: &TlsInfo,
        auto: bool,
    ) -> Result<Self> {
        match (manual.is_empty(), auto) {
            (true, false) => Ok(TlsMode::Disabled),
            (true, true) => Ok(TlsMode::Auto),
            (false, false) => Ok(TlsMode::Manual(manual.clone())),
            (false, true) => Err(Error::config(format!(
                "{role} TLS: manual bundle and auto TLS are mutually exclusive"
            ))),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, TlsMode::Disabled)
    }
}

/// Material resolved for one role: one bundle per node, plus the bundle a
/// consumer (store client, or an extra peer) uses to connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned {
    pub nodes: Vec<Option<TlsInfo>>,
    pub consumer: Option<TlsInfo>,
}

pub struct TlsProvisioner {
    role: TlsRole,
    mode: TlsMode,
    dir: PathBuf,
}

impl TlsProvisioner {
    /// Generated material lands in `<work_dir>/tls/<role>/`.
    pub fn new(
        role: TlsRole,
        mode: TlsMode,
        work_dir: &Path,
    ) -> Self {
        Self {
            role,
            mode,
            dir: work_dir.join(TLS_DIR).join(role.as_str()),
        }
    }

    pub fn role(&self) -> TlsRole {
        self.role
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Produces ready-to-use bundles for every node.
    ///
    /// `node_hosts[i]` lists the hosts node `i` advertises; in auto mode they
    /// become SANs of that node's certificate.
    pub fn provision(
        &self,
        node_hosts: &[Vec<String>],
    ) -> Result<Provisioned> {
        match &self.mode {
            TlsMode::Disabled => Ok(Provisioned {
                nodes: vec![None; node_hosts.len()],
                consumer: None,
            }),
            TlsMode::Manual(info) => {
                validate_bundle(self.role, info)?;
                debug!(role = %self.role, "using manual TLS bundle");
                Ok(Provisioned {
                    nodes: vec![Some(info.clone()); node_hosts.len()],
                    consumer: Some(info.clone()),
                })
            }
            TlsMode::Auto => self.generate(node_hosts),
        }
    }

    fn generate(
        &self,
        node_hosts: &[Vec<String>],
    ) -> Result<Provisioned> {
        fs::create_dir_all(&self.dir).map_err(|source| ProvisioningError::WriteFile {
            path: self.dir.clone(),
            source,
        })?;

        let ca = CertificateAuthority::generate(self.role)?;
        let ca_path = self.dir.join(CA_CERT_FILE);
        write_pem(&ca_path, &ca.cert_pem())?;

        // peers authenticate each other; clients only verify the server
        let client_cert_auth = self.role == TlsRole::Peer;

        let mut nodes = Vec::with_capacity(node_hosts.len());
        for (index, hosts) in node_hosts.iter().enumerate() {
            let name = crate::node::node_name(index);
            let issued = ca.issue(&name, hosts)?;
            nodes.push(Some(self.write_leaf(&name, &issued, &ca_path, client_cert_auth)?));
        }

        let consumer_hosts = vec!["localhost".to_string()];
        let issued = ca.issue(CONSUMER_NAME, &consumer_hosts)?;
        let consumer = self.write_leaf(CONSUMER_NAME, &issued, &ca_path, client_cert_auth)?;

        info!(
            role = %self.role,
            dir = %self.dir.display(),
            nodes = nodes.len(),
            "generated TLS material"
        );
        Ok(Provisioned {
            nodes,
            consumer: Some(consumer),
        })
    }

    fn write_leaf(
        &self,
        name: &str,
        issued: &IssuedCertificate,
        ca_path: &Path,
        client_cert_auth: bool,
    ) -> Result<TlsInfo> {
        let cert_file = self.dir.join(format!("{name}.pem"));
        let key_file = self.dir.join(format!("{name}-key.pem"));
        write_pem(&cert_file, &issued.cert_pem)?;
        write_pem(&key_file, &issued.key_pem)?;
        Ok(TlsInfo::new(cert_file, key_file, ca_path, client_cert_auth))
    }
}

/// Rejects a manual bundle whose files are missing or unusable.
pub fn validate_bundle(
    role: TlsRole,
    info: &TlsInfo,
) -> Result<()> {
    info.validate_paths(role.as_str())?;
    server_config(info).map(|_| ())
}

fn write_pem(
    path: &Path,
    pem: &str,
) -> Result<()> {
    fs::write(path, pem).map_err(|source| {
        ProvisioningError::WriteFile {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}
