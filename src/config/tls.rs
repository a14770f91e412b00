use std::path::Path;
use std::path::PathBuf;

use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// A certificate/key/CA triple for one transport role.
///
/// An empty bundle (all paths unset) means "no manual TLS" for that role.
#[derive(Debug, Serialize, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct TlsInfo {
    /// Certificate chain presented by the server side (and as client identity)
    #[serde(default)]
    pub cert_file: Option<PathBuf>,

    /// Private key matching `cert_file`, PEM encoded
    #[serde(default)]
    pub key_file: Option<PathBuf>,

    /// CA bundle used to verify the remote side
    #[serde(default)]
    pub trusted_ca_file: Option<PathBuf>,

    /// Require and verify client certificates (mutual TLS)
    #[serde(default)]
    pub client_cert_auth: bool,
}

impl TlsInfo {
    pub fn new(
        cert_file: impl Into<PathBuf>,
        key_file: impl Into<PathBuf>,
        trusted_ca_file: impl Into<PathBuf>,
        client_cert_auth: bool,
    ) -> Self {
        Self {
            cert_file: Some(cert_file.into()),
            key_file: Some(key_file.into()),
            trusted_ca_file: Some(trusted_ca_file.into()),
            client_cert_auth,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cert_file.is_none() && self.key_file.is_none() && self.trusted_ca_file.is_none()
    }

    /// Checks that every path is set and points to an existing file.
    ///
    /// Parsing the contents is the provisioner's job; this only rejects
    /// bundles that can never work.
    pub fn validate_paths(
        &self,
        role: &str,
    ) -> Result<()> {
        check_file(role, "cert_file", self.cert_file.as_deref())?;
        check_file(role, "key_file", self.key_file.as_deref())?;
        check_file(role, "trusted_ca_file", self.trusted_ca_file.as_deref())?;
        Ok(())
    }

    /// Paths of a bundle that already passed [`TlsInfo::validate_paths`].
    pub(crate) fn paths(&self) -> Result<(&Path, &Path, &Path)> {
        match (
            self.cert_file.as_deref(),
            self.key_file.as_deref(),
            self.trusted_ca_file.as_deref(),
        ) {
            (Some(cert), Some(key), Some(ca)) => Ok((cert, key, ca)),
            _ => Err(Error::config("TLS bundle is incomplete")),
        }
    }
}

fn check_file(
    role: &str,
    field: &str,
    path: Option<&Path>,
) -> Result<()> {
    let path = match path {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => {
            return Err(Error::config(format!(
                "{role} TLS: {field} must be set when manual TLS is configured"
            )))
        }
    };
    if !path.is_file() {
        return Err(Error::config(format!(
            "{role} TLS: {field} {} does not exist or is not a file",
            path.display()
        )));
    }
    Ok(())
}
