//! Key derivation: Argon2id for the master unlock key, HKDF-SHA256 for the
//! per-role subkeys.

use std::time::{Duration, Instant};

use argon2::{Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;
use zeroize::Zeroize;

use super::keys::{MasterUnlockKey, SymmetricKey, KEY_LEN};
use super::secret::SecretBytes;
use super::CryptoError;

pub const SALT_LEN: usize = 16;

/// Argon2id cost parameters, persisted in the workspace metadata so unlock
/// can replay the exact derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argon2Params {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
    pub version: u32,
}

impl Argon2Params {
    /// Conservative fallback used when benchmarking is skipped or fails.
    pub fn default_params() -> Self {
        Argon2Params {
            memory_kib: 64 * 1024,
            iterations: 3,
            parallelism: 1,
            version: 0x13,
        }
    }

    /// Cheap parameters for tests. Not acceptable for real workspaces.
    pub fn insecure_fast() -> Self {
        Argon2Params {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
            version: 0x13,
        }
    }
}

/// Derives the 32-byte master unlock key from a passphrase. The passphrase
/// container is not consumed here; callers dispose it when their scope ends.
pub fn derive_muk(
    passphrase: &SecretBytes,
    salt: &[u8; SALT_LEN],
    params: &Argon2Params,
) -> Result<MasterUnlockKey, CryptoError> {
    if params.version != 0x13 {
        return Err(CryptoError::ParameterUnreasonable(format!(
            "unsupported argon2 version {}",
            params.version
        )));
    }
    let argon_params = Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LEN),
    )
    .map_err(|e| CryptoError::ParameterUnreasonable(e.to_string()))?;
    let argon2 = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);

    let mut okm = [0u8; KEY_LEN];
    argon2
        .hash_password_into(passphrase.expose()?, salt, &mut okm)
        .map_err(|e| CryptoError::ParameterUnreasonable(e.to_string()))?;
    let key = MasterUnlockKey::from_bytes(okm);
    okm.zeroize();
    Ok(key)
}

/// HKDF-SHA256 expansion of a 32-byte parent key into a 32-byte subkey.
pub fn hkdf_derive(key: &[u8; KEY_LEN], info: &str) -> Result<SecretBytes, CryptoError> {
    let hk = Hkdf::<Sha256>::new(None, key);
    let mut okm = vec![0u8; KEY_LEN];
    hk.expand(info.as_bytes(), &mut okm)
        .map_err(|e| CryptoError::ParameterUnreasonable(e.to_string()))?;
    Ok(SecretBytes::new(okm))
}

const TARGET_DERIVATION: Duration = Duration::from_millis(1000);
const BENCH_MEMORY_KIB: [u32; 3] = [32 * 1024, 64 * 1024, 128 * 1024];

/// Benchmarks the Argon2 cost grid on this device and returns the
/// combination whose measured derivation time lands closest to one second.
/// Release builds never go below 64 MiB. Blocking; run on a worker thread.
pub fn benchmark_params() -> Argon2Params {
    let passphrase = SecretBytes::from_slice(b"benchmark passphrase");
    let salt = [0x5au8; SALT_LEN];

    let mut best = Argon2Params::default_params();
    let mut best_distance = Duration::MAX;

    for memory_kib in BENCH_MEMORY_KIB {
        for iterations in 1..=5u32 {
            let candidate = Argon2Params {
                memory_kib,
                iterations,
                parallelism: 1,
                version: 0x13,
            };
            let start = Instant::now();
            if derive_muk(&passphrase, &salt, &candidate).is_err() {
                continue;
            }
            let elapsed = start.elapsed();
            let distance = elapsed.abs_diff(TARGET_DERIVATION);
            debug!(
                memory_kib,
                iterations,
                elapsed_ms = elapsed.as_millis() as u64,
                "argon2 benchmark sample"
            );
            if distance < best_distance {
                best_distance = distance;
                best = candidate;
            }
            // Past the target already; more iterations only move away from it.
            if elapsed > TARGET_DERIVATION * 2 {
                break;
            }
        }
    }

    if !cfg!(debug_assertions) && best.memory_kib < 64 * 1024 {
        best.memory_kib = 64 * 1024;
    }
    best
}
