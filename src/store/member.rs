use std::fs;
use std::path::Path;

use serde::Deserialize;
use serde::Serialize;
use tracing::info;

use crate::constants::MEMBER_FILE;
use crate::NodeConfig;
use crate::Result;
use crate::StoreError;

/// Who a data directory belongs to. Written on first start, checked on
/// every restart.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct MemberIdentity {
    pub cluster_token: String,
    pub index: usize,
}

impl std::fmt::Display for MemberIdentity {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(f, "node {} of cluster {}", self.index, self.cluster_token)
    }
}

impl MemberIdentity {
    pub fn of(config: &NodeConfig) -> Self {
        Self {
            cluster_token: config.cluster_token.clone(),
            index: config.index,
        }
    }
}

/// Persists the identity of a fresh data directory, or verifies that an
/// existing one was created by the same member of the same cluster.
pub fn claim_data_dir(
    data_dir: &Path,
    expected: &MemberIdentity,
) -> Result<bool> {
    let path = data_dir.join(MEMBER_FILE);
    if path.exists() {
        let buffer = fs::read(&path).map_err(|source| StoreError::Persist {
            path: path.clone(),
            source,
        })?;
        let found: MemberIdentity =
            bincode::deserialize(&buffer).map_err(|source| StoreError::Corrupted { path, source })?;
        if &found != expected {
            return Err(StoreError::ForeignDataDir {
                expected: expected.to_string(),
                found: found.to_string(),
            }
            .into());
        }
        info!("rejoining as {}", found);
        return Ok(false);
    }

    fs::create_dir_all(data_dir)?;
    let buffer = bincode::serialize(expected).map_err(|source| StoreError::Corrupted {
        path: path.clone(),
        source,
    })?;
    fs::write(&path, buffer).map_err(|source| StoreError::Persist { path, source })?;
    info!("initialised data directory as {}", expected);
    Ok(true)
}
