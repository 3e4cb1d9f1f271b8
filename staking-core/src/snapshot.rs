//! Durable state snapshots
//!
//! A snapshot file is a SHA-256 digest of the payload followed by the
//! bincode-encoded [`ChainState`]. Files are written to a sibling
//! temporary path and renamed into place, so a crash never leaves a
//! half-written snapshot behind.

use crate::state::ChainState;
use crate::{Error, Result};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const DIGEST_LEN: usize = 32;

/// Default snapshot file inside `data_dir`
pub fn snapshot_path(data_dir: &Path) -> PathBuf {
    data_dir.join("state.snapshot")
}

/// Write `state` to `path`
pub fn save(path: &Path, state: &ChainState) -> Result<()> {
    let payload = bincode::serialize(state)?;
    let digest = Sha256::digest(&payload);

    let mut bytes = Vec::with_capacity(DIGEST_LEN + payload.len());
    bytes.extend_from_slice(&digest);
    bytes.extend_from_slice(&payload);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, &bytes)?;
    fs::rename(&tmp, path)?;
    info!(path = %path.display(), bytes = bytes.len(), "snapshot saved");
    Ok(())
}

/// Read a snapshot; `None` when no file exists yet
pub fn load(path: &Path) -> Result<Option<ChainState>> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no snapshot found");
            return Ok(None);
        }
        Err(err) => return Err(err.into()),
    };
    if bytes.len() < DIGEST_LEN {
        return Err(Error::inconsistent("snapshot truncated"));
    }
    let (digest, payload) = bytes.split_at(DIGEST_LEN);
    if Sha256::digest(payload).as_slice() != digest {
        return Err(Error::inconsistent("snapshot digest mismatch"));
    }
    let state: ChainState = bincode::deserialize(payload)?;
    state.check_invariants()?;
    info!(path = %path.display(), "snapshot loaded");
    Ok(Some(state))
}
