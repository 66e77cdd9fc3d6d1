//! Versioned field cipher for PII at rest.
//!
//! Wire format: `"v<keyVersion>:" + base64(salt[16] || nonce[12] || ciphertext+tag)`.
//! The AES-256-GCM key is derived per call from the generation's passphrase
//! via HKDF-SHA256 with the random salt, so encrypting the same plaintext
//! twice yields different ciphertext. The version prefix routes decryption
//! to the current key or to a retained legacy key; legacy reads log an
//! advisory so the caller can re-save under the current generation.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use std::collections::HashMap;

use crate::config::EncryptionConfig;
use crate::services::ServiceError;
use crate::utils::hashing;

const SALT_LENGTH: usize = 16;
const NONCE_LENGTH: usize = 12;
const TAG_LENGTH: usize = 16;
const KEY_LENGTH: usize = 32;
const HKDF_INFO: &[u8] = b"member-service-field-cipher";

#[derive(Clone)]
pub struct EncryptionService {
    current_version: String,
    current_passphrase: String,
    legacy_passphrases: HashMap<String, String>,
}

impl EncryptionService {
    pub fn new(config: &EncryptionConfig) -> Result<Self, ServiceError> {
        let legacy_passphrases: HashMap<String, String> =
            config.legacy_keys.iter().cloned().collect();

        if legacy_passphrases.contains_key(&config.key_version) {
            return Err(ServiceError::Config(anyhow::anyhow!(
                "current key version '{}' collides with a legacy key version",
                config.key_version
            )));
        }

        for version in legacy_passphrases.keys() {
            tracing::info!(key_version = %version, "Loaded legacy encryption key");
        }
        tracing::info!(key_version = %config.key_version, "Encryption service initialized");

        Ok(Self {
            current_version: config.key_version.clone(),
            current_passphrase: config.password.clone(),
            legacy_passphrases,
        })
    }

    pub fn current_version(&self) -> &str {
        &self.current_version
    }

    /// Encrypt under the current key generation.
    ///
    /// Empty input passes through unchanged so optional fields stay absent
    /// rather than becoming ciphertext of the empty string.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, ServiceError> {
        if plaintext.is_empty() {
            return Ok(plaintext.to_string());
        }

        let blob = encrypt_with_passphrase(&self.current_passphrase, plaintext.as_bytes())
            .map_err(ServiceError::EncryptionFailed)?;
        Ok(format!("v{}:{}", self.current_version, blob))
    }

    /// Decrypt a stored field value, routing by its version prefix.
    ///
    /// Values without a recognizable prefix are a pre-versioning legacy
    /// format; they are decrypted with the current key as a best-effort
    /// fallback and flagged in the log.
    pub fn decrypt(&self, encrypted: &str) -> Result<String, ServiceError> {
        if encrypted.is_empty() {
            return Ok(encrypted.to_string());
        }

        if let Some((version, payload)) = parse_version_prefix(encrypted) {
            if version == self.current_version {
                return decrypt_with_passphrase(&self.current_passphrase, payload)
                    .map_err(ServiceError::DecryptionFailed);
            }

            return match self.legacy_passphrases.get(version) {
                Some(passphrase) => {
                    tracing::info!(
                        from_version = %version,
                        to_version = %self.current_version,
                        "Decrypted with legacy key; value should be re-encrypted on next save"
                    );
                    decrypt_with_passphrase(passphrase, payload)
                        .map_err(ServiceError::DecryptionFailed)
                }
                None => {
                    tracing::error!(key_version = %version, "No encryptor for key version");
                    Err(ServiceError::UnknownKeyVersion(version.to_string()))
                }
            };
        }

        tracing::warn!("Decrypting legacy format (no version prefix) - consider re-encrypting");
        decrypt_with_passphrase(&self.current_passphrase, encrypted)
            .map_err(ServiceError::DecryptionFailed)
    }

    /// Whether a stored value was written under the current key generation.
    /// Callers use this to drive lazy re-encryption on the next write.
    pub fn is_current(&self, encrypted: &str) -> bool {
        match parse_version_prefix(encrypted) {
            Some((version, _)) => version == self.current_version,
            None => false,
        }
    }

    /// Deterministic digest for uniqueness checks and lookups. Key-free, so
    /// it survives key rotation; see [`hashing::sha256_hex`].
    pub fn hash(&self, plaintext: &str) -> Option<String> {
        hashing::sha256_hex(plaintext)
    }
}

/// Split `"v<version>:<payload>"`. The payload may itself contain `:`.
fn parse_version_prefix(value: &str) -> Option<(&str, &str)> {
    let rest = value.strip_prefix('v')?;
    let (version, payload) = rest.split_once(':')?;
    if version.is_empty() {
        return None;
    }
    Some((version, payload))
}

fn derive_key(passphrase: &str, salt: &[u8]) -> Result<[u8; KEY_LENGTH], anyhow::Error> {
    let hkdf = Hkdf::<Sha256>::new(Some(salt), passphrase.as_bytes());
    let mut key = [0u8; KEY_LENGTH];
    hkdf.expand(HKDF_INFO, &mut key)
        .map_err(|e| anyhow::anyhow!("key derivation failed: {}", e))?;
    Ok(key)
}

fn encrypt_with_passphrase(passphrase: &str, plaintext: &[u8]) -> Result<String, anyhow::Error> {
    let mut salt = [0u8; SALT_LENGTH];
    OsRng.fill_bytes(&mut salt);
    let mut nonce_bytes = [0u8; NONCE_LENGTH];
    OsRng.fill_bytes(&mut nonce_bytes);

    let key = derive_key(passphrase, &salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| anyhow::anyhow!("cipher init failed: {}", e))?;

    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), plaintext)
        .map_err(|e| anyhow::anyhow!("AEAD encrypt failed: {}", e))?;

    let mut blob = Vec::with_capacity(SALT_LENGTH + NONCE_LENGTH + ciphertext.len());
    blob.extend_from_slice(&salt);
    blob.extend_from_slice(&nonce_bytes);
    blob.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(blob))
}

fn decrypt_with_passphrase(passphrase: &str, payload: &str) -> Result<String, anyhow::Error> {
    let blob = BASE64
        .decode(payload)
        .map_err(|e| anyhow::anyhow!("invalid base64 payload: {}", e))?;

    if blob.len() < SALT_LENGTH + NONCE_LENGTH + TAG_LENGTH {
        return Err(anyhow::anyhow!("ciphertext too short"));
    }

    let (salt, rest) = blob.split_at(SALT_LENGTH);
    let (nonce_bytes, ciphertext) = rest.split_at(NONCE_LENGTH);

    let key = derive_key(passphrase, salt)?;
    let cipher = Aes256Gcm::new_from_slice(&key)
        .map_err(|e| anyhow::anyhow!("cipher init failed: {}", e))?;

    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| anyhow::anyhow!("AEAD decrypt failed (wrong key or tampered data)"))?;

    String::from_utf8(plaintext).map_err(|e| anyhow::anyhow!("decrypted data not UTF-8: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(version: &str, password: &str, legacy: Vec<(String, String)>) -> EncryptionConfig {
        EncryptionConfig {
            password: password.to_string(),
            key_version: version.to_string(),
            legacy_keys: legacy,
        }
    }

    fn service() -> EncryptionService {
        EncryptionService::new(&config("1", "test-passphrase", vec![])).unwrap()
    }

    #[test]
    fn test_round_trip() {
        let svc = service();
        assert_eq!(svc.current_version(), "1");
        let encrypted = svc.encrypt("user@example.com").unwrap();
        assert!(encrypted.starts_with("v1:"));
        assert_eq!(svc.decrypt(&encrypted).unwrap(), "user@example.com");
    }

    #[test]
    fn test_empty_input_passes_through() {
        let svc = service();
        assert_eq!(svc.encrypt("").unwrap(), "");
        assert_eq!(svc.decrypt("").unwrap(), "");
    }

    #[test]
    fn test_ciphertext_is_nondeterministic() {
        let svc = service();
        let a = svc.encrypt("same plaintext").unwrap();
        let b = svc.encrypt("same plaintext").unwrap();
        assert_ne!(a, b);
        assert_eq!(svc.decrypt(&a).unwrap(), svc.decrypt(&b).unwrap());
    }

    #[test]
    fn test_rotation_keeps_old_ciphertext_readable() {
        let v1 = service();
        let old = v1.encrypt("+91-9876543210").unwrap();

        let v2 = EncryptionService::new(&config(
            "2",
            "new-passphrase",
            vec![("1".to_string(), "test-passphrase".to_string())],
        ))
        .unwrap();

        assert_eq!(v2.decrypt(&old).unwrap(), "+91-9876543210");
        assert!(!v2.is_current(&old));

        let fresh = v2.encrypt("+91-9876543210").unwrap();
        assert!(fresh.starts_with("v2:"));
        assert!(v2.is_current(&fresh));
    }

    #[test]
    fn test_unknown_version_is_rejected() {
        let v1 = service();
        let ciphertext = v1.encrypt("secret").unwrap();

        let v2 = EncryptionService::new(&config("2", "new-passphrase", vec![])).unwrap();
        match v2.decrypt(&ciphertext) {
            Err(ServiceError::UnknownKeyVersion(version)) => assert_eq!(version, "1"),
            other => panic!("expected UnknownKeyVersion, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_versionless_input_falls_back_to_current_key() {
        let svc = service();
        let encrypted = svc.encrypt("legacy value").unwrap();
        let stripped = encrypted.strip_prefix("v1:").unwrap();
        assert_eq!(svc.decrypt(stripped).unwrap(), "legacy value");
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let svc = service();
        let encrypted = svc.encrypt("integrity matters").unwrap();
        let mut chars: Vec<char> = encrypted.chars().collect();
        let last = chars.len() - 1;
        chars[last] = if chars[last] == 'A' { 'B' } else { 'A' };
        let tampered: String = chars.into_iter().collect();

        assert!(matches!(
            svc.decrypt(&tampered),
            Err(ServiceError::DecryptionFailed(_))
        ));
    }

    #[test]
    fn test_wrong_key_never_returns_garbage() {
        let svc = service();
        let encrypted = svc.encrypt("secret").unwrap();
        let payload = encrypted.strip_prefix("v1:").unwrap();

        let other = EncryptionService::new(&config("1", "different-passphrase", vec![])).unwrap();
        assert!(other.decrypt(&format!("v1:{}", payload)).is_err());
    }

    #[test]
    fn test_current_version_may_not_collide_with_legacy() {
        let result = EncryptionService::new(&config(
            "1",
            "pass",
            vec![("1".to_string(), "old-pass".to_string())],
        ));
        assert!(matches!(result, Err(ServiceError::Config(_))));
    }
}
