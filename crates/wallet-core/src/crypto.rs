//! Cryptographic operations for the secure store
//!
//! - AES-256-GCM for symmetric encryption
//! - Argon2id key derivation from the device secret
//! - Secure memory handling with zeroization

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use argon2::{Argon2, Params, Version};
use rand::RngCore;
use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};
use zeroize::Zeroize;

use crate::error::{WalletError, WalletResult};
use crate::models::WalletConfig;

/// Size of AES-256 key in bytes
pub const KEY_SIZE: usize = 32;

/// Size of AES-GCM nonce in bytes
pub const NONCE_SIZE: usize = 12;

/// Size of Argon2 salt in bytes
pub const SALT_SIZE: usize = 32;

/// Size of the per-device secret in bytes
pub const DEVICE_SECRET_SIZE: usize = 32;

/// Key protecting the store contents
pub struct StoreKey {
    key: Secret<[u8; KEY_SIZE]>,
}

impl StoreKey {
    /// Derive the store key from the device secret using Argon2id
    pub fn derive(secret: &[u8], salt: &[u8; SALT_SIZE], config: &WalletConfig) -> WalletResult<Self> {
        let params = Params::new(
            config.argon2_memory_kb,
            config.argon2_iterations,
            config.argon2_parallelism,
            Some(KEY_SIZE),
        )
        .map_err(|e| WalletError::KeyDerivationError(e.to_string()))?;

        let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, params);

        let mut output = [0u8; KEY_SIZE];
        argon2
            .hash_password_into(secret, salt, &mut output)
            .map_err(|e| WalletError::KeyDerivationError(e.to_string()))?;

        let key = Secret::new(output);
        output.zeroize();

        Ok(Self { key })
    }

    /// Encrypt data with a fresh random nonce
    pub fn encrypt(&self, plaintext: &[u8]) -> WalletResult<(Vec<u8>, [u8; NONCE_SIZE])> {
        let cipher = Aes256Gcm::new_from_slice(self.key.expose_secret())
            .map_err(|e| WalletError::EncryptionError(e.to_string()))?;

        let nonce_bytes = generate_nonce();
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext)
            .map_err(|e| WalletError::EncryptionError(e.to_string()))?;

        Ok((ciphertext, nonce_bytes))
    }

    pub fn decrypt(&self, ciphertext: &[u8], nonce: &[u8; NONCE_SIZE]) -> WalletResult<Vec<u8>> {
        let cipher = Aes256Gcm::new_from_slice(self.key.expose_secret())
            .map_err(|e| WalletError::DecryptionError(e.to_string()))?;

        let nonce = Nonce::from_slice(nonce);

        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| WalletError::DecryptionError("Decryption failed - wrong device secret or corrupted data".to_string()))
    }
}

/// Generate a cryptographically secure random salt
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Generate a cryptographically secure random nonce
pub fn generate_nonce() -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// Generate a new random device secret
pub fn generate_device_secret() -> Secret<[u8; DEVICE_SECRET_SIZE]> {
    let mut secret = [0u8; DEVICE_SECRET_SIZE];
    OsRng.fill_bytes(&mut secret);
    let wrapped = Secret::new(secret);
    secret.zeroize();
    wrapped
}

/// Compute SHA-256 checksum of data
pub fn compute_checksum(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Verify SHA-256 checksum
pub fn verify_checksum(data: &[u8], expected: &[u8; 32]) -> bool {
    let computed = compute_checksum(data);
    constant_time_compare(&computed, expected)
}

/// Constant-time comparison to prevent timing attacks
fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
pub(crate) fn test_config() -> WalletConfig {
    WalletConfig {
        argon2_memory_kb: 1024,
        argon2_iterations: 1,
        argon2_parallelism: 1,
        ..WalletConfig::default()
    }
}
