//! Content-addressed object store under `<vault>/objects/`.
//!
//! Objects are immutable AEAD blobs named by the BLAKE2b-256 of their own
//! bytes, sharded into two-character prefix directories `00`..`ff` that are
//! created eagerly. No garbage collection; stale objects wait for an
//! explicit compaction outside the core.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::crypto::hash::blake2b_hex;
use crate::error::{CoreError, CoreResult};

use super::fs;

pub const OBJECTS_DIR: &str = "objects";

pub struct ObjectStore {
    root: PathBuf,
}

impl ObjectStore {
    /// Opens the store, creating all 256 prefix directories if absent.
    pub fn init(vault_root: &Path) -> CoreResult<Self> {
        let root = vault_root.join(OBJECTS_DIR);
        for prefix in 0..=0xffu32 {
            let dir = root.join(format!("{prefix:02x}"));
            std::fs::create_dir_all(&dir).map_err(|e| CoreError::io(&dir, e))?;
        }
        Ok(ObjectStore { root })
    }

    /// Stores a ciphertext blob and returns its hash. Idempotent: a blob
    /// that already exists by name is not rewritten.
    pub fn put(&self, ciphertext: &[u8]) -> CoreResult<String> {
        let hash = blake2b_hex(ciphertext);
        let path = self.path_for(&hash)?;
        if path.exists() {
            debug!(%hash, "object already present");
            return Ok(hash);
        }
        fs::atomic_write(&path, ciphertext)?;
        Ok(hash)
    }

    pub fn get(&self, hash: &str) -> CoreResult<Option<Vec<u8>>> {
        fs::read_bytes_opt(&self.path_for(hash)?)
    }

    pub fn exists(&self, hash: &str) -> bool {
        self.path_for(hash).map(|p| p.exists()).unwrap_or(false)
    }

    fn path_for(&self, hash: &str) -> CoreResult<PathBuf> {
        if hash.len() != 64 || !hash.bytes().all(|b| b.is_ascii_hexdigit() && !b.is_ascii_uppercase())
        {
            return Err(CoreError::InvalidInput(format!(
                "malformed object hash: {hash:?}"
            )));
        }
        Ok(self.root.join(&hash[..2]).join(&hash[2..]))
    }
}
