//! Key derivation using Argon2id.
//!
//! The master key of a hierarchy is derived from the passphrase with a
//! memory-hard KDF, then expanded with HKDF-SHA256 into purpose-bound keys
//! so the raw Argon2 output never keys a cipher directly.

use argon2::Argon2;
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::ZeroizeOnDrop;

use crate::config::KdfParams;
use crate::error::{Result, TallyError};

/// Length of derived keys in bytes (256 bits).
pub const KEY_LENGTH: usize = 32;

/// Minimum salt length accepted by [`derive_key`].
pub const MIN_SALT_LENGTH: usize = 16;

/// A cryptographic key derived from a passphrase.
///
/// Key material is zeroized from memory when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_LENGTH],
}

impl DerivedKey {
    pub(crate) fn from_bytes(bytes: [u8; KEY_LENGTH]) -> Self {
        Self { key: bytes }
    }

    /// Get a reference to the raw key bytes.
    ///
    /// # Security
    ///
    /// Avoid storing or logging this value. Use only for immediate operations.
    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.key
    }

    /// Expand this key into a sub-key bound to `purpose`.
    pub fn expand(&self, purpose: &[u8]) -> Result<DerivedKey> {
        let hk = Hkdf::<Sha256>::new(None, &self.key);
        let mut okm = [0u8; KEY_LENGTH];
        hk.expand(purpose, &mut okm)
            .map_err(|e| TallyError::Security(format!("HKDF expand failed: {}", e)))?;
        Ok(DerivedKey::from_bytes(okm))
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive a master key from a passphrase using Argon2id.
///
/// Same passphrase + salt + params always produce the same key; the salt
/// and params are stored alongside the wrapped hash.
pub fn derive_key(passphrase: &str, salt: &[u8], params: &KdfParams) -> Result<DerivedKey> {
    if passphrase.is_empty() {
        return Err(TallyError::InvalidInput(
            "Passphrase cannot be empty".to_string(),
        ));
    }

    if salt.len() < MIN_SALT_LENGTH {
        return Err(TallyError::InvalidInput(format!(
            "Salt must be at least {} bytes",
            MIN_SALT_LENGTH
        )));
    }

    params.validate()?;

    let argon_params = argon2::Params::new(
        params.memory_kib,
        params.iterations,
        params.parallelism,
        Some(KEY_LENGTH),
    )
    .map_err(|e| TallyError::Security(format!("Failed to create Argon2 params: {}", e)))?;

    let argon2 = Argon2::new(
        argon2::Algorithm::Argon2id,
        argon2::Version::V0x13,
        argon_params,
    );

    let mut key_bytes = [0u8; KEY_LENGTH];
    argon2
        .hash_password_into(passphrase.as_bytes(), salt, &mut key_bytes)
        .map_err(|e| TallyError::Security(format!("Key derivation failed: {}", e)))?;

    Ok(DerivedKey::from_bytes(key_bytes))
}

/// Fill a fixed-size buffer from the OS random source.
pub(crate) fn random_array<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| TallyError::Security(format!("Random source failed: {}", e)))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> KdfParams {
        KdfParams::insecure_fast()
    }

    #[test]
    fn test_key_derivation_deterministic() {
        let salt = b"unique-salt-1234567890123456";

        let key1 = derive_key("test-passphrase", salt, &fast()).unwrap();
        let key2 = derive_key("test-passphrase", salt, &fast()).unwrap();

        assert_eq!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_salt_different_key() {
        let key1 = derive_key("test-passphrase", b"salt1-1234567890123456", &fast()).unwrap();
        let key2 = derive_key("test-passphrase", b"salt2-1234567890123456", &fast()).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_different_params_different_key() {
        let salt = b"fixed-salt-123456789012345";
        let slower = KdfParams {
            iterations: 2,
            ..fast()
        };

        let key1 = derive_key("passphrase-one", salt, &fast()).unwrap();
        let key2 = derive_key("passphrase-one", salt, &slower).unwrap();

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let result = derive_key("", b"salt-1234567890123456", &fast());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Passphrase cannot be empty"));
    }

    #[test]
    fn test_short_salt_rejected() {
        let result = derive_key("test-passphrase", b"short", &fast());
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Salt must be at least 16 bytes"));
    }

    #[test]
    fn test_expand_is_purpose_bound() {
        let key = derive_key("test-passphrase", b"salt-1234567890123456", &fast()).unwrap();
        let wrap = key.expand(b"wrap").unwrap();
        let check = key.expand(b"check").unwrap();
        assert_ne!(wrap.as_bytes(), check.as_bytes());
        assert_ne!(wrap.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_derived_key_debug_redacts() {
        let key = derive_key("test-passphrase", b"salt-1234567890123456", &fast()).unwrap();

        let debug_output = format!("{:?}", key);
        assert!(debug_output.contains("REDACTED"));

        let key_hex = hex::encode(&key.as_bytes()[..4]);
        assert!(!debug_output.contains(&key_hex));
    }

    #[test]
    fn test_random_array_varies() {
        let a: [u8; 16] = random_array().unwrap();
        let b: [u8; 16] = random_array().unwrap();
        assert_ne!(a, b);
    }
}
