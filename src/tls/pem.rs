use std::fs;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use rustls::crypto::CryptoProvider;
use rustls::pki_types::CertificateDer;
use rustls::pki_types::PrivateKeyDer;
use rustls::server::WebPkiClientVerifier;
use rustls::RootCertStore;
use rustls::ServerConfig;

use crate::ProvisioningError;
use crate::Result;
use crate::TlsInfo;

fn open(path: &Path) -> Result<BufReader<fs::File>> {
    let file = fs::File::open(path).map_err(|source| ProvisioningError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(BufReader::new(file))
}

/// Load a PEM certificate chain, in file order.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|source| ProvisioningError::ReadFile {
            path: path.to_path_buf(),
            source,
        })?;

    if certs.is_empty() {
        return Err(ProvisioningError::NoCertificates(path.to_path_buf()).into());
    }
    Ok(certs)
}

/// Load the first PKCS#8, PKCS#1 or SEC1 private key of a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>> {
    let mut reader = open(path)?;
    for item in rustls_pemfile::read_all(&mut reader) {
        match item {
            Ok(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(PrivateKeyDer::Pkcs8(key)),
            Ok(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(PrivateKeyDer::Pkcs1(key)),
            Ok(rustls_pemfile::Item::Sec1Key(key)) => return Ok(PrivateKeyDer::Sec1(key)),
            Ok(_) => {}
            Err(source) => {
                return Err(ProvisioningError::ReadFile {
                    path: path.to_path_buf(),
                    source,
                }
                .into())
            }
        }
    }
    Err(ProvisioningError::NoPrivateKey(path.to_path_buf()).into())
}

pub fn load_root_store(path: &Path) -> Result<RootCertStore> {
    let mut roots = RootCertStore::empty();
    for cert in load_certs(path)? {
        roots.add(cert).map_err(|e| {
            ProvisioningError::Rustls(format!("invalid CA certificate in {}: {e}", path.display()))
        })?;
    }
    Ok(roots)
}

pub(crate) fn crypto_provider() -> Arc<CryptoProvider> {
    Arc::new(rustls::crypto::ring::default_provider())
}

/// Server side TLS for one listener.
///
/// When `client_cert_auth` is set, clients must present a certificate signed
/// by the bundle's CA.
pub fn server_config(info: &TlsInfo) -> Result<Arc<ServerConfig>> {
    let (cert_path, key_path, ca_path) = info.paths()?;
    let certs = load_certs(cert_path)?;
    let key = load_private_key(key_path)?;
    let roots = Arc::new(load_root_store(ca_path)?);

    let provider = crypto_provider();
    let builder = ServerConfig::builder_with_provider(provider.clone())
        .with_safe_default_protocol_versions()
        .map_err(rustls_error)?;

    let mut config = if info.client_cert_auth {
        let verifier = WebPkiClientVerifier::builder_with_provider(roots, provider)
            .build()
            .map_err(|e| ProvisioningError::Rustls(format!("client verifier: {e}")))?;
        builder
            .with_client_cert_verifier(verifier)
            .with_single_cert(certs, key)
            .map_err(rustls_error)?
    } else {
        builder.with_no_client_auth().with_single_cert(certs, key).map_err(rustls_error)?
    };
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(Arc::new(config))
}

fn rustls_error(e: rustls::Error) -> ProvisioningError {
    ProvisioningError::Rustls(e.to_string())
}
