use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::path::PathBuf;

use parking_lot::Mutex;
use serde::Deserialize;
use serde::Serialize;
use tracing::debug;
use tracing::info;

use crate::constants::KV_DB_FILE;
use crate::Result;
use crate::StoreError;

/// Orders writes across nodes: higher revision wins, origin breaks ties.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Version {
    pub revision: u64,
    pub origin: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Entry {
    pub value: String,
    pub version: Version,
}

pub type Snapshot = BTreeMap<String, Entry>;

/// Key-value map persisted as a single bincode file in the data directory.
#[derive(Debug)]
pub struct KvStore {
    path: PathBuf,
    entries: Mutex<Snapshot>,
}

impl KvStore {
    /// Opens the store in `data_dir`, loading previously persisted entries.
    pub fn open(data_dir: &Path) -> Result<Self> {
        let path = data_dir.join(KV_DB_FILE);
        let entries = if path.exists() {
            let buffer = fs::read(&path).map_err(|source| StoreError::Persist {
                path: path.clone(),
                source,
            })?;
            bincode::deserialize::<Snapshot>(&buffer).map_err(|source| StoreError::Corrupted {
                path: path.clone(),
                source,
            })?
        } else {
            Snapshot::new()
        };

        info!(path = %path.display(), keys = entries.len(), "opened kv store");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    pub fn get(
        &self,
        key: &str,
    ) -> Option<Entry> {
        self.entries.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Applies a write accepted by this node, stamping it with a revision
    /// newer than anything the node has seen.
    pub fn put(
        &self,
        key: &str,
        value: String,
        origin: usize,
    ) -> Result<Entry> {
        let mut entries = self.entries.lock();
        let revision = entries.values().map(|e| e.version.revision).max().unwrap_or(0) + 1;
        let entry = Entry {
            value,
            version: Version { revision, origin },
        };
        entries.insert(key.to_string(), entry.clone());
        self.persist(&entries)?;
        Ok(entry)
    }

    /// Applies a replicated entry if it is newer than the local one.
    pub fn merge(
        &self,
        key: &str,
        entry: Entry,
    ) -> Result<bool> {
        let mut entries = self.entries.lock();
        if !apply(&mut entries, key, entry) {
            return Ok(false);
        }
        self.persist(&entries)?;
        Ok(true)
    }

    /// Merges a whole peer snapshot; returns how many keys changed.
    pub fn merge_snapshot(
        &self,
        snapshot: Snapshot,
    ) -> Result<usize> {
        let mut entries = self.entries.lock();
        let changed = snapshot
            .into_iter()
            .filter(|(key, entry)| apply(&mut entries, key, entry.clone()))
            .count();
        if changed > 0 {
            self.persist(&entries)?;
        }
        Ok(changed)
    }

    pub fn snapshot(&self) -> Snapshot {
        self.entries.lock().clone()
    }

    /// Writes to a temporary file then renames it over the previous one.
    fn persist(
        &self,
        entries: &Snapshot,
    ) -> Result<()> {
        let buffer = bincode::serialize(entries).map_err(|source| StoreError::Corrupted {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, buffer)
            .and_then(|_| fs::rename(&tmp, &self.path))
            .map_err(|source| StoreError::Persist {
                path: self.path.clone(),
                source,
            })?;
        debug!(keys = entries.len(), "kv store persisted");
        Ok(())
    }
}

fn apply(
    entries: &mut Snapshot,
    key: &str,
    entry: Entry,
) -> bool {
    match entries.get(key) {
        Some(current) if current.version >= entry.version => false,
        _ => {
            entries.insert(key.to_string(), entry);
            true
        }
    }
}
