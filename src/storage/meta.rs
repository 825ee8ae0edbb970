//! Root-handle persistence in a sidecar file.
//!
//! The sidecar `<backing>.meta` holds exactly the raw bytes of the root's
//! [`NodeHandle`] triple. The fixed-width little-endian bincode
//! configuration writes the triple as those 8 bytes, and the file is
//! rewritten in full (truncate, write, close) on every checkpoint.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use crate::error::{IndexError, IndexResult};
use crate::storage::handle::NodeHandle;

/// Sidecar path for a backing file: the same name with `.meta` appended.
pub fn meta_path(backing_path: &Path) -> PathBuf {
    let mut name = backing_path.as_os_str().to_owned();
    name.push(".meta");
    PathBuf::from(name)
}

/// Rewrite the sidecar with the given root handle.
pub fn write_root(backing_path: &Path, root: NodeHandle) -> IndexResult<()> {
    let bytes = bincode::serde::encode_to_vec(root, bincode::config::legacy())
        .map_err(|e| IndexError::Serialization(e.to_string()))?;
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .open(meta_path(backing_path))?;
    file.write_all(&bytes)?;
    file.sync_all()?;
    Ok(())
}

/// Recover the root handle from the sidecar.
pub fn read_root(backing_path: &Path) -> IndexResult<NodeHandle> {
    let mut file = OpenOptions::new().read(true).open(meta_path(backing_path))?;
    let mut bytes = Vec::new();
    file.read_to_end(&mut bytes)?;
    bincode::serde::decode_from_slice(&bytes, bincode::config::legacy())
        .map(|(root, _)| root)
        .map_err(|e| IndexError::Serialization(e.to_string()))
}
