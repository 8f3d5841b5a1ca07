//! AES-256-GCM authenticated encryption
//!
//! Blob layout: `nonce (12) || ciphertext || tag (16)`.
//! The nonce is prepended so a blob can be opened without external state.

use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::rand::{SecureRandom, SystemRandom};
use std::fmt;
use zeroize::Zeroizing;

use crate::{CryptoError, Result};

/// Name recorded in workspace metadata
pub const ALGORITHM: &str = "AES-256-GCM";
/// 256-bit key (32 bytes)
pub const KEY_SIZE: usize = 32;
/// 96-bit nonce (12 bytes)
pub const NONCE_SIZE: usize = NONCE_LEN;
/// 128-bit GCM tag
pub const TAG_SIZE: usize = 16;

/// Generate a cryptographically secure random nonce
fn generate_nonce(rng: &SystemRandom) -> Result<[u8; NONCE_SIZE]> {
    let mut nonce = [0u8; NONCE_SIZE];
    rng.fill(&mut nonce).map_err(|_| CryptoError::Random)?;
    Ok(nonce)
}

/// Short-lived cipher handle bound to one derived key.
///
/// Build one per operation from [`crate::cipher_for`]; do not cache it.
pub struct Cipher {
    key: LessSafeKey,
    rng: SystemRandom,
}

impl Cipher {
    pub fn new(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(CryptoError::InvalidKeySize(key.len()));
        }
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| CryptoError::InvalidKeySize(key.len()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
            rng: SystemRandom::new(),
        })
    }

    /// Encrypt plaintext under a fresh random nonce.
    ///
    /// Returns: nonce || ciphertext || tag
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let nonce_bytes = generate_nonce(&self.rng)?;

        let mut sealed = Vec::with_capacity(plaintext.len() + TAG_SIZE);
        sealed.extend_from_slice(plaintext);
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut sealed,
            )
            .map_err(|_| CryptoError::Encryption)?;

        let mut blob = Vec::with_capacity(NONCE_SIZE + sealed.len());
        blob.extend_from_slice(&nonce_bytes);
        blob.extend_from_slice(&sealed);
        Ok(blob)
    }

    /// Decrypt a blob produced by [`Cipher::encrypt`].
    ///
    /// Any tag mismatch is reported as [`CryptoError::Authentication`]; no
    /// partial plaintext is ever returned.
    pub fn decrypt(&self, blob: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
        if blob.len() < NONCE_SIZE + TAG_SIZE {
            return Err(CryptoError::Authentication);
        }

        let (nonce_bytes, sealed) = blob.split_at(NONCE_SIZE);
        let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
            .map_err(|_| CryptoError::Authentication)?;

        let mut buffer = Zeroizing::new(sealed.to_vec());
        let plaintext_len = self
            .key
            .open_in_place(nonce, Aad::empty(), buffer.as_mut_slice())
            .map_err(|_| CryptoError::Authentication)?
            .len();
        buffer.truncate(plaintext_len);

        Ok(buffer)
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher")
            .field("algorithm", &ALGORITHM)
            .finish_non_exhaustive()
    }
}
