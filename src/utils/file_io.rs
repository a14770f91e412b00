use std::fs::create_dir_all;
use std::fs::File;
use std::fs::OpenOptions;
use std::io;
use std::path::Path;

use tracing::error;

pub fn create_parent_dir_if_not_exist(path: &Path) -> io::Result<()> {
    if let Some(parent_dir) = path.parent() {
        if !parent_dir.exists() {
            if let Err(e) = create_dir_all(parent_dir) {
                error!("Failed to create directory {:?}: {:?}", parent_dir, e);
                return Err(e);
            }
        }
    }
    Ok(())
}

/// Opens `path` for appending, creating it and its parents when missing.
pub fn open_file_for_append(path: &Path) -> io::Result<File> {
    create_parent_dir_if_not_exist(path)?;
    OpenOptions::new().append(true).create(true).open(path)
}
