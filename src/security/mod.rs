//! Secret storage for platform credentials
//!
//! The commerce-platform access token is stored in SQLite encrypted with
//! AES-256-GCM. The master key lives in a local file next to the database
//! rather than the OS keychain, which avoids a password prompt on every
//! app launch.

use crate::error::{AppError, Result};
use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::Engine;
use rand::RngCore;
use std::path::{Path, PathBuf};

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const KEY_FILE: &str = "master.key";

/// Encrypts and decrypts secrets with a file-backed master key
pub struct SecretStore {
    cipher: Aes256Gcm,
}

impl SecretStore {
    /// Load the master key from `data_dir`, creating it on first launch
    pub fn new(data_dir: &Path) -> Result<Self> {
        let key = load_or_create_key(&data_dir.join(KEY_FILE))?;
        Self::from_key(&key)
    }

    /// Build a store from a raw key (tests)
    pub fn from_key(key: &[u8]) -> Result<Self> {
        if key.len() != KEY_SIZE {
            return Err(AppError::Encryption(format!(
                "Invalid key size: expected {}, got {}",
                KEY_SIZE,
                key.len()
            )));
        }
        let cipher = Aes256Gcm::new_from_slice(key)
            .map_err(|e| AppError::Encryption(e.to_string()))?;
        Ok(Self { cipher })
    }

    /// Generate a random key (tests)
    pub fn generate_key() -> Vec<u8> {
        let mut key = vec![0u8; KEY_SIZE];
        OsRng.fill_bytes(&mut key);
        key
    }

    /// Encrypt a secret, returns (ciphertext_base64, nonce_base64)
    pub fn encrypt(&self, plaintext: &str) -> Result<(String, String)> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| AppError::Encryption(e.to_string()))?;

        let engine = base64::engine::general_purpose::STANDARD;
        Ok((engine.encode(&ciphertext), engine.encode(nonce_bytes)))
    }

    /// Decrypt a secret previously produced by `encrypt`
    pub fn decrypt(&self, ciphertext_b64: &str, nonce_b64: &str) -> Result<String> {
        let engine = base64::engine::general_purpose::STANDARD;
        let ciphertext = engine
            .decode(ciphertext_b64)
            .map_err(|e| AppError::Encryption(format!("Invalid ciphertext base64: {}", e)))?;
        let nonce_bytes = engine
            .decode(nonce_b64)
            .map_err(|e| AppError::Encryption(format!("Invalid nonce base64: {}", e)))?;

        if nonce_bytes.len() != NONCE_SIZE {
            return Err(AppError::Encryption(format!(
                "Invalid nonce size: expected {}, got {}",
                NONCE_SIZE,
                nonce_bytes.len()
            )));
        }

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_ref())
            .map_err(|e| AppError::Encryption(format!("Decryption failed: {}", e)))?;

        String::from_utf8(plaintext)
            .map_err(|e| AppError::Encryption(format!("Invalid UTF-8 in plaintext: {}", e)))
    }
}

fn load_or_create_key(path: &PathBuf) -> Result<Vec<u8>> {
    let engine = base64::engine::general_purpose::STANDARD;

    if path.exists() {
        let encoded = std::fs::read_to_string(path)?;
        let key = engine
            .decode(encoded.trim())
            .map_err(|e| AppError::Encryption(format!("Corrupt master key file: {}", e)))?;
        return Ok(key);
    }

    let key = SecretStore::generate_key();
    std::fs::write(path, engine.encode(&key))?;
    tracing::info!("Generated new master key at {:?}", path);
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let store = SecretStore::from_key(&SecretStore::generate_key()).unwrap();

        let token = "shpat_0123456789abcdef";
        let (ciphertext, nonce) = store.encrypt(token).unwrap();
        assert_eq!(store.decrypt(&ciphertext, &nonce).unwrap(), token);
    }

    #[test]
    fn test_nonces_are_unique_per_encryption() {
        let store = SecretStore::from_key(&SecretStore::generate_key()).unwrap();

        let (c1, n1) = store.encrypt("same").unwrap();
        let (c2, n2) = store.encrypt("same").unwrap();
        assert_ne!(c1, c2);
        assert_ne!(n1, n2);
    }

    #[test]
    fn test_wrong_nonce_fails() {
        let store = SecretStore::from_key(&SecretStore::generate_key()).unwrap();

        let (ciphertext, _) = store.encrypt("secret").unwrap();
        let (_, other_nonce) = store.encrypt("other").unwrap();
        assert!(store.decrypt(&ciphertext, &other_nonce).is_err());
    }

    #[test]
    fn test_key_persists_across_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store1 = SecretStore::new(dir.path()).unwrap();
        let (ciphertext, nonce) = store1.encrypt("token").unwrap();

        let store2 = SecretStore::new(dir.path()).unwrap();
        assert_eq!(store2.decrypt(&ciphertext, &nonce).unwrap(), "token");
    }

    #[test]
    fn test_invalid_key_size_rejected() {
        assert!(SecretStore::from_key(&[0u8; 16]).is_err());
    }
}
