//! BLAKE2b-256 hashing for content addressing and file-change dedup.

use blake2b_simd::Params;

pub const DIGEST_LEN: usize = 32;

pub fn blake2b_256(bytes: &[u8]) -> [u8; DIGEST_LEN] {
    let hash = Params::new().hash_length(DIGEST_LEN).hash(bytes);
    let mut out = [0u8; DIGEST_LEN];
    out.copy_from_slice(hash.as_bytes());
    out
}

/// Lowercase hex digest, the on-disk name of a content object.
pub fn blake2b_hex(bytes: &[u8]) -> String {
    hex::encode(blake2b_256(bytes))
}
