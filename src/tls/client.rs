use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::ProvisioningError;
use crate::Result;
use crate::TlsInfo;

fn read(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|source| {
        ProvisioningError::ReadFile {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Builds the HTTP client a store client (or a peer) uses to reach nodes.
///
/// With a bundle, the client trusts only the bundle's CA and presents the
/// bundle's certificate as its identity, which is what mutual TLS listeners
/// expect.
pub fn http_client(
    tls: Option<&TlsInfo>,
    timeout: Duration,
) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .use_rustls_tls()
        .no_proxy()
        .connect_timeout(timeout)
        .timeout(timeout);

    if let Some(info) = tls {
        let (cert_path, key_path, ca_path) = info.paths()?;

        let ca_pem = read(ca_path)?;
        let roots = reqwest::Certificate::from_pem_bundle(&ca_pem).map_err(|e| {
            ProvisioningError::HttpClient(format!("invalid CA bundle {}: {e}", ca_path.display()))
        })?;
        builder = builder.tls_built_in_root_certs(false);
        for root in roots {
            builder = builder.add_root_certificate(root);
        }

        let mut identity = read(cert_path)?;
        identity.push(b'\n');
        identity.extend_from_slice(&read(key_path)?);
        let identity = reqwest::Identity::from_pem(&identity)
            .map_err(|e| ProvisioningError::HttpClient(format!("invalid client identity: {e}")))?;
        builder = builder.identity(identity);
    }

    builder
        .build()
        .map_err(|e| ProvisioningError::HttpClient(e.to_string()).into())
}
