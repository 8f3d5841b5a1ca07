//! scrypt key derivation
//!
//! The same `(passphrase, salt, params)` triple always yields the same key,
//! which is what lets a workspace be reopened after a restart.

use ring::rand::{SecureRandom, SystemRandom};
use std::time::Instant;
use tracing::debug;
use zeroize::Zeroizing;

use crate::{CryptoError, Result, KEY_SIZE};

/// Name recorded in workspace metadata
pub const KDF_NAME: &str = "scrypt";
/// Per-workspace salt length in bytes
pub const SALT_SIZE: usize = 16;

/// scrypt cost parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    /// log2 of the CPU/memory cost `N`
    pub log_n: u8,
    /// Block size
    pub r: u32,
    /// Parallelism
    pub p: u32,
}

impl Default for KdfParams {
    /// N = 2^14, r = 8, p = 1 (~16 MiB per derivation)
    fn default() -> Self {
        Self { log_n: 14, r: 8, p: 1 }
    }
}

impl KdfParams {
    /// Cheap parameters for tests. Never use for real data.
    pub fn insecure_fast() -> Self {
        Self { log_n: 4, r: 8, p: 1 }
    }
}

/// Derive a 256-bit key from a passphrase and salt
pub fn derive_key(
    passphrase: &[u8],
    salt: &[u8],
    params: &KdfParams,
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let scrypt_params = scrypt::Params::new(params.log_n, params.r, params.p, KEY_SIZE)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    let started = Instant::now();
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    scrypt::scrypt(passphrase, salt, &scrypt_params, &mut key[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;

    debug!(
        log_n = params.log_n,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "derived workspace key"
    );
    Ok(key)
}

/// Generate a fresh random salt
pub fn generate_salt() -> Result<Vec<u8>> {
    let mut salt = vec![0u8; SALT_SIZE];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| CryptoError::Random)?;
    Ok(salt)
}
