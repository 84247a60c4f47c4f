//! Encrypted JSONL metadata indices under `<vault>/refs/`.
//!
//! The whole index is one AEAD encryption of the newline-joined JSON rows,
//! rewritten atomically on every mutation. Indices are small next to
//! content, and whole-file encryption sidesteps the impossibility of
//! streaming appends into an authenticated blob.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use zeroize::Zeroize;

use crate::crypto::hash::blake2b_256;
use crate::crypto::keys::{SearchIndexKey, SymmetricKey};
use crate::error::{CoreError, CoreResult};

use super::fs;

pub const REFS_DIR: &str = "refs";

pub struct EncryptedIndex<T> {
    path: PathBuf,
    aad: &'static [u8],
    _rows: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> EncryptedIndex<T> {
    pub fn new(vault_root: &Path, file_name: &str, aad: &'static [u8]) -> Self {
        EncryptedIndex {
            path: vault_root.join(REFS_DIR).join(file_name),
            aad,
            _rows: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads all rows. A missing file is an empty index; an authentication
    /// failure is a corrupted one.
    pub fn load(&self, key: &SearchIndexKey) -> CoreResult<Vec<T>> {
        let Some(sealed) = fs::read_bytes_opt(&self.path)? else {
            return Ok(Vec::new());
        };
        let mut plaintext = key
            .open(&sealed, self.aad)
            .map_err(|_| CoreError::CorruptedIndex(self.path.clone()))?;

        let mut rows = Vec::new();
        for line in plaintext.split(|&b| b == b'\n') {
            if line.is_empty() {
                continue;
            }
            let row = serde_json::from_slice(line)
                .map_err(|_| CoreError::CorruptedIndex(self.path.clone()))?;
            rows.push(row);
        }
        plaintext.zeroize();
        Ok(rows)
    }

    /// Rewrites the index as a whole and returns the BLAKE2b of the sealed
    /// file for self-write bookkeeping.
    pub fn store(&self, key: &SearchIndexKey, rows: &[T]) -> CoreResult<(Vec<u8>, [u8; 32])> {
        let mut plaintext = Vec::new();
        for row in rows {
            serde_json::to_writer(&mut plaintext, row)?;
            plaintext.push(b'\n');
        }
        let sealed = key.seal(&plaintext, self.aad)?;
        plaintext.zeroize();

        fs::atomic_write(&self.path, &sealed)?;
        let digest = blake2b_256(&sealed);
        Ok((sealed, digest))
    }
}
