//! Age X25519 encryption/decryption utilities.
//!
//! Wraps the Age library so an X25519 identity can serve as one of the
//! symmetric key sets of a hierarchy. The raw key material is the identity's
//! Bech32 secret string; the recipient is derived from it on load.

use age::secrecy::ExposeSecret;
use age::x25519::{Identity, Recipient};
use zeroize::Zeroizing;

use crate::error::{Result, TallyError};

/// An Age identity and its matching recipient.
#[derive(Clone)]
pub struct AgeKey {
    identity: Identity,
    recipient: Recipient,
}

impl AgeKey {
    /// Generate a fresh identity.
    pub fn generate() -> Self {
        let identity = Identity::generate();
        let recipient = identity.to_public();
        Self {
            identity,
            recipient,
        }
    }

    /// Rebuild from raw bytes produced by [`AgeKey::to_raw`].
    pub fn from_raw(raw: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(raw)
            .map_err(|_| TallyError::Security("Age key is not valid UTF-8".to_string()))?;
        let identity: Identity = text
            .parse()
            .map_err(|e| TallyError::Security(format!("Invalid Age key: {}", e)))?;
        let recipient = identity.to_public();
        Ok(Self {
            identity,
            recipient,
        })
    }

    /// Raw key material (the secret identity string).
    pub fn to_raw(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.identity.to_string().expose_secret().as_bytes().to_vec())
    }

    /// Encrypt data to this key's recipient.
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        age::encrypt(&self.recipient, data)
            .map_err(|e| TallyError::Security(format!("Age encryption failed: {}", e)))
    }

    /// Decrypt data with this key's identity.
    ///
    /// # Errors
    ///
    /// Returns `TallyError::Security` if the data was encrypted to another
    /// key or is corrupted.
    pub fn decrypt(&self, encrypted_data: &[u8]) -> Result<Vec<u8>> {
        age::decrypt(&self.identity, encrypted_data)
            .map_err(|e| TallyError::Security(format!("Age decryption failed: {}", e)))
    }
}

impl std::fmt::Debug for AgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgeKey")
            .field("recipient", &self.recipient.to_string())
            .field("identity", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let key = AgeKey::generate();
        let plaintext = b"Hello, World! This is secret data.";

        let encrypted = key.encrypt(plaintext).unwrap();
        assert_ne!(encrypted.as_slice(), plaintext);
        assert_eq!(key.decrypt(&encrypted).unwrap(), plaintext);
    }

    #[test]
    fn test_wrong_key_fails_decryption() {
        let key1 = AgeKey::generate();
        let key2 = AgeKey::generate();

        let encrypted = key1.encrypt(b"secret data").unwrap();
        let result = key2.decrypt(&encrypted);
        assert!(matches!(result, Err(TallyError::Security(_))));
    }

    #[test]
    fn test_raw_round_trip_keeps_identity() {
        let key = AgeKey::generate();
        let restored = AgeKey::from_raw(&key.to_raw()).unwrap();

        let encrypted = key.encrypt(b"payload").unwrap();
        assert_eq!(restored.decrypt(&encrypted).unwrap(), b"payload");
    }

    #[test]
    fn test_corrupted_data_fails_decryption() {
        let key = AgeKey::generate();
        let mut encrypted = key.encrypt(b"secret data").unwrap();
        let len = encrypted.len();
        encrypted[len - 1] ^= 0xFF;
        assert!(key.decrypt(&encrypted).is_err());
    }

    #[test]
    fn test_debug_redacts_identity() {
        let key = AgeKey::generate();
        let debug_output = format!("{:?}", key);
        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains("AGE-SECRET-KEY"));
    }
}
