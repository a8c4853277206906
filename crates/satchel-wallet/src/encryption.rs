//! AES-256-GCM encryption for persisted wallet entries.
//!
//! Keys are derived from the user's password with Argon2id (default
//! parameters: 19 MiB memory, 2 passes, 1 lane).
//!
//! # Wire format
//! ```text
//! salt (32 bytes) || nonce (12 bytes) || ciphertext + auth_tag
//! ```

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use argon2::Argon2;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::WalletError;

/// Salt length in bytes.
const SALT_LEN: usize = 32;

/// AES-GCM nonce length in bytes.
const NONCE_LEN: usize = 12;

/// AES-GCM authentication tag length in bytes.
const TAG_LEN: usize = 16;

/// Minimum encrypted payload size (salt + nonce + auth tag).
const MIN_ENCRYPTED_LEN: usize = SALT_LEN + NONCE_LEN + TAG_LEN;

/// Derive a 256-bit encryption key from a password and salt using Argon2id.
///
/// The salt must be at least 8 bytes.
pub fn derive_key(password: &[u8], salt: &[u8]) -> Result<[u8; 32], WalletError> {
    let mut key = [0u8; 32];
    Argon2::default()
        .hash_password_into(password, salt, &mut key)
        .map_err(|e| WalletError::StorageFailure(format!("key derivation: {e}")))?;
    Ok(key)
}

/// Encrypt plaintext with a password using AES-256-GCM.
///
/// Generates a random 32-byte salt and 12-byte nonce. Returns
/// `salt || nonce || ciphertext+tag`.
pub fn encrypt(plaintext: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    let mut salt = [0u8; SALT_LEN];
    let mut nonce_bytes = [0u8; NONCE_LEN];
    rand::rngs::OsRng.fill_bytes(&mut salt);
    rand::rngs::OsRng.fill_bytes(&mut nonce_bytes);

    let mut key = derive_key(password, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key);
    key.zeroize();
    let cipher = cipher.map_err(|e| WalletError::StorageFailure(e.to_string()))?;
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| WalletError::StorageFailure(e.to_string()))?;

    let mut result = Vec::with_capacity(SALT_LEN + NONCE_LEN + ciphertext.len());
    result.extend_from_slice(&salt);
    result.extend_from_slice(&nonce_bytes);
    result.extend_from_slice(&ciphertext);
    Ok(result)
}

/// Decrypt data that was encrypted with [`encrypt`].
///
/// Returns [`WalletError::InvalidPassword`] if the authentication tag does
/// not match, which covers both a wrong password and tampered data.
pub fn decrypt(encrypted: &[u8], password: &[u8]) -> Result<Vec<u8>, WalletError> {
    if encrypted.len() < MIN_ENCRYPTED_LEN {
        return Err(WalletError::CorruptedData(format!(
            "encrypted data too short: {} < {MIN_ENCRYPTED_LEN}",
            encrypted.len()
        )));
    }

    let salt = &encrypted[..SALT_LEN];
    let nonce_bytes = &encrypted[SALT_LEN..SALT_LEN + NONCE_LEN];
    let ciphertext = &encrypted[SALT_LEN + NONCE_LEN..];

    let mut key = derive_key(password, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key);
    key.zeroize();
    let cipher = cipher.map_err(|e| WalletError::StorageFailure(e.to_string()))?;
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| WalletError::InvalidPassword)
}
