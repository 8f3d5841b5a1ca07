//! Speckeep Crypto - key derivation and authenticated encryption
//!
//! This crate provides:
//! - scrypt key derivation from the process passphrase and a per-workspace salt
//! - AES-256-GCM sealing of document payloads (`nonce || ciphertext || tag`)
//! - OS-backed randomness for salts and nonces
//!
//! Derived keys live in `Zeroizing` buffers and never leave this crate in raw form.

pub mod cipher;
pub mod kdf;

pub use cipher::{Cipher, ALGORITHM, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
pub use kdf::{derive_key, generate_salt, KdfParams, KDF_NAME, SALT_SIZE};

/// Errors that can occur in cryptographic operations
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed")]
    Encryption,

    #[error("Authentication failed - data is corrupted, tampered, or the key is wrong")]
    Authentication,

    #[error("Invalid key size: expected {KEY_SIZE}, got {0}")]
    InvalidKeySize(usize),

    #[error("System random source unavailable")]
    Random,
}

pub type Result<T> = std::result::Result<T, CryptoError>;

/// Derive the workspace key and wrap it in a cipher handle.
///
/// The raw key is zeroized as soon as the handle has been built.
pub fn cipher_for(passphrase: &[u8], salt: &[u8], params: &KdfParams) -> Result<Cipher> {
    let key = derive_key(passphrase, salt, params)?;
    Cipher::new(&key[..])
}
