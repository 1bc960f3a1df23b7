//! Key wrapping hierarchy.
//!
//! A passphrase-derived master hash protects a set of randomly generated
//! symmetric keys. Application data is only ever encrypted with the
//! symmetric keys, so a passphrase change (rewrap) touches O(#keys) bytes,
//! while a full re-key replaces the keys and re-encrypts every field.
//!
//! Master hash layout:
//!
//! ```text
//! [V(1)][MEM(4)][ITER(4)][LANES(4)][SALT(16)][NONCE(12)][CHECK(N)][TAG(16)]
//! ```

use std::sync::Arc;

use chacha20poly1305::aead::KeyInit;
use chacha20poly1305::ChaCha20Poly1305;
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::cipher::{aead_open, aead_open_with, aead_seal, aead_seal_with, Algorithm, CipherSet, SymmetricKeySet, NONCE_LEN, TAG_LEN};
use super::key::{derive_key, random_array};
use super::passphrase::{validate_passphrase, KnownPassphrase, PassphraseRequest, PassphraseResolver};
use crate::bulk::BulkReport;
use crate::cancel::Cancellation;
use crate::config::{KdfParams, KeyConfig};
use crate::error::{Result, TallyError};
use crate::versioned::VersionedList;

const HASH_VERSION: u8 = 1;
const SALT_LEN: usize = 16;
const HEADER_LEN: usize = 1 + 4 + 4 + 4 + SALT_LEN;
const CHECK_PLAINTEXT: &[u8] = b"tally-master-hash-check";
const WRAP_PURPOSE: &[u8] = b"tally-key-wrap-v1";
const CHECK_PURPOSE: &[u8] = b"tally-hash-check-v1";

/// Passphrase attempts before giving up on a stored hash.
pub const MAX_PASSPHRASE_ATTEMPTS: u32 = 3;

/// A resolved master hash: its stored bytes plus the in-memory wrap cipher.
#[derive(Clone)]
struct MasterHash {
    bytes: Vec<u8>,
    wrap: ChaCha20Poly1305,
}

impl MasterHash {
    fn create(passphrase: &str, kdf: &KdfParams) -> Result<Self> {
        let salt: [u8; SALT_LEN] = random_array()?;
        let master = derive_key(passphrase, &salt, kdf)?;
        let check = Self::cipher_for(&master, CHECK_PURPOSE)?;
        let wrap = Self::cipher_for(&master, WRAP_PURPOSE)?;

        let mut bytes = Vec::with_capacity(HEADER_LEN + NONCE_LEN + CHECK_PLAINTEXT.len() + TAG_LEN);
        bytes.push(HASH_VERSION);
        bytes.extend_from_slice(&kdf.memory_kib.to_le_bytes());
        bytes.extend_from_slice(&kdf.iterations.to_le_bytes());
        bytes.extend_from_slice(&kdf.parallelism.to_le_bytes());
        bytes.extend_from_slice(&salt);
        bytes.extend_from_slice(&aead_seal(&check, CHECK_PLAINTEXT)?);

        Ok(Self { bytes, wrap })
    }

    fn resolve(bytes: &[u8], passphrase: &str) -> Result<Self> {
        if bytes.len() < HEADER_LEN + NONCE_LEN + TAG_LEN {
            return Err(TallyError::Data("Master hash is truncated".to_string()));
        }
        if bytes[0] != HASH_VERSION {
            return Err(TallyError::Data(format!(
                "Unsupported master hash version: {}",
                bytes[0]
            )));
        }
        let read_u32 = |offset: usize| {
            let mut word = [0u8; 4];
            word.copy_from_slice(&bytes[offset..offset + 4]);
            u32::from_le_bytes(word)
        };
        let kdf = KdfParams {
            memory_kib: read_u32(1),
            iterations: read_u32(5),
            parallelism: read_u32(9),
        };
        kdf.validate()
            .map_err(|e| TallyError::Data(format!("Master hash has unusable KDF parameters: {}", e)))?;
        let (header, sealed_check) = bytes.split_at(HEADER_LEN);
        let salt = &header[13..];

        let master = derive_key(passphrase, salt, &kdf)?;
        let check = Self::cipher_for(&master, CHECK_PURPOSE)?;
        let opened = aead_open(&check, sealed_check).map_err(|_| TallyError::IncorrectPassphrase)?;
        if opened != CHECK_PLAINTEXT {
            return Err(TallyError::IncorrectPassphrase);
        }

        Ok(Self {
            bytes: bytes.to_vec(),
            wrap: Self::cipher_for(&master, WRAP_PURPOSE)?,
        })
    }

    fn cipher_for(master: &super::key::DerivedKey, purpose: &[u8]) -> Result<ChaCha20Poly1305> {
        let sub = master.expand(purpose)?;
        ChaCha20Poly1305::new_from_slice(sub.as_bytes())
            .map_err(|_| TallyError::Security("Invalid wrap key length".to_string()))
    }

    /// Wrap a key's raw bytes, authenticating its id and algorithm.
    fn wrap(&self, key: &SymmetricKeySet) -> Result<WrappedKey> {
        let aad = wrap_aad(key.key_id(), key.algorithm());
        Ok(WrappedKey {
            key_id: key.key_id(),
            algorithm: key.algorithm(),
            wrapped: aead_seal_with(&self.wrap, key.raw(), &aad)?,
        })
    }

    fn unwrap(&self, wrapped: &WrappedKey) -> Result<Zeroizing<Vec<u8>>> {
        let aad = wrap_aad(wrapped.key_id, wrapped.algorithm);
        aead_open_with(&self.wrap, &wrapped.wrapped, &aad)
            .map(Zeroizing::new)
            .map_err(|_| TallyError::Security(format!("Failed to unwrap key {}", wrapped.key_id)))
    }
}

/// `key_id || algorithm tag`
fn wrap_aad(key_id: Uuid, algorithm: Algorithm) -> [u8; 17] {
    let mut aad = [0u8; 17];
    aad[..16].copy_from_slice(key_id.as_bytes());
    aad[16] = algorithm.tag();
    aad
}

/// A symmetric key's raw bytes wrapped under a master hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrappedKey {
    pub key_id: Uuid,
    pub algorithm: Algorithm,
    #[serde(with = "crate::codec::base64_bytes")]
    pub wrapped: Vec<u8>,
}

/// Persistable form of a hierarchy. Contains no secrets in the clear.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredHierarchy {
    pub id: Uuid,
    #[serde(with = "crate::codec::base64_bytes")]
    pub hash: Vec<u8>,
    pub keys: Vec<WrappedKey>,
}

/// Passphrase-derived master hash protecting a set of symmetric keys.
pub struct KeyHierarchy {
    id: Uuid,
    hash: MasterHash,
    wrapped_keys: Vec<WrappedKey>,
    cipher_set: Arc<CipherSet>,
}

/// Outcome of a dataset re-key.
#[derive(Debug)]
pub struct Rekeyed {
    pub hierarchy: KeyHierarchy,
    pub report: BulkReport,
}

impl KeyHierarchy {
    /// Create a new hierarchy with fresh keys for every configured algorithm.
    pub fn create(passphrase: &str, config: &KeyConfig) -> Result<Self> {
        validate_passphrase(passphrase)?;
        config.validate()?;

        let hash = MasterHash::create(passphrase, &config.kdf)?;
        let mut keys = Vec::with_capacity(config.algorithms.len());
        let mut wrapped_keys = Vec::with_capacity(config.algorithms.len());
        for algorithm in &config.algorithms {
            let key = SymmetricKeySet::generate(*algorithm)?;
            wrapped_keys.push(hash.wrap(&key)?);
            keys.push(Arc::new(key));
        }

        let hierarchy = Self {
            id: Uuid::new_v4(),
            hash,
            wrapped_keys,
            cipher_set: Arc::new(CipherSet::new(keys)?),
        };
        tracing::info!(
            hierarchy = %hierarchy.id,
            keys = hierarchy.wrapped_keys.len(),
            "created key hierarchy"
        );
        Ok(hierarchy)
    }

    /// Open a stored hierarchy with a known passphrase.
    pub fn open(stored: &StoredHierarchy, passphrase: &str) -> Result<Self> {
        Self::resolve(stored, &mut KnownPassphrase::new(passphrase))
    }

    /// Open a stored hierarchy, asking `resolver` for the passphrase.
    ///
    /// The resolver is asked again after a rejected passphrase, up to
    /// [`MAX_PASSPHRASE_ATTEMPTS`] times. Any failure here is fatal for the
    /// caller's load: nothing protected can be read without the keys.
    pub fn resolve(stored: &StoredHierarchy, resolver: &mut dyn PassphraseResolver) -> Result<Self> {
        let mut hash = None;
        for attempt in 1..=MAX_PASSPHRASE_ATTEMPTS {
            let request = PassphraseRequest {
                hierarchy_id: stored.id,
                attempt,
            };
            // Declining after a rejection reports the rejection.
            let Some(passphrase) = resolver.resolve(&request) else {
                return Err(if attempt == 1 {
                    TallyError::Cancelled
                } else {
                    TallyError::IncorrectPassphrase
                });
            };
            match MasterHash::resolve(&stored.hash, passphrase.expose_secret()) {
                Ok(resolved) => {
                    hash = Some(resolved);
                    break;
                }
                Err(TallyError::IncorrectPassphrase) => {
                    tracing::warn!(hierarchy = %stored.id, attempt, "passphrase rejected");
                }
                Err(err) => return Err(err),
            }
        }
        let hash = hash.ok_or(TallyError::IncorrectPassphrase)?;

        let mut keys = Vec::with_capacity(stored.keys.len());
        for wrapped in &stored.keys {
            let raw = hash.unwrap(wrapped)?;
            keys.push(Arc::new(SymmetricKeySet::from_raw(
                wrapped.key_id,
                wrapped.algorithm,
                &raw,
            )?));
        }
        if keys.is_empty() {
            return Err(TallyError::Data(
                "Stored hierarchy has no keys".to_string(),
            ));
        }

        tracing::debug!(hierarchy = %stored.id, keys = keys.len(), "resolved key hierarchy");
        Ok(Self {
            id: stored.id,
            hash,
            wrapped_keys: stored.keys.clone(),
            cipher_set: Arc::new(CipherSet::new(keys)?),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The live cipher set used by encrypted fields.
    pub fn cipher_set(&self) -> &Arc<CipherSet> {
        &self.cipher_set
    }

    pub fn wrapped_hash(&self) -> &[u8] {
        &self.hash.bytes
    }

    pub fn wrapped_keys(&self) -> &[WrappedKey] {
        &self.wrapped_keys
    }

    pub fn to_stored(&self) -> StoredHierarchy {
        StoredHierarchy {
            id: self.id,
            hash: self.hash.bytes.clone(),
            keys: self.wrapped_keys.clone(),
        }
    }

    /// Copy for a derived dataset: same keys, own record of the wrapped bytes.
    pub fn clone_for_dataset(&self) -> Self {
        Self {
            id: Uuid::new_v4(),
            hash: self.hash.clone(),
            wrapped_keys: self.wrapped_keys.clone(),
            cipher_set: Arc::clone(&self.cipher_set),
        }
    }

    /// Change the passphrase. Keys, ciphertext and plaintext are untouched.
    pub fn rewrap(&mut self, new_passphrase: &str, kdf: &KdfParams) -> Result<()> {
        validate_passphrase(new_passphrase)?;
        kdf.validate()?;

        let hash = MasterHash::create(new_passphrase, kdf)?;
        let mut wrapped_keys = Vec::with_capacity(self.cipher_set.len());
        for key in self.cipher_set.keys() {
            wrapped_keys.push(hash.wrap(key)?);
        }

        self.hash = hash;
        self.wrapped_keys = wrapped_keys;
        tracing::info!(hierarchy = %self.id, "rewrapped key hierarchy");
        Ok(())
    }

    /// Build an entirely new hierarchy to replace this one.
    pub fn rekey(&self, new_passphrase: &str, config: &KeyConfig) -> Result<KeyHierarchy> {
        KeyHierarchy::create(new_passphrase, config)
    }

    /// Re-key and migrate every encrypted field in `lists`.
    ///
    /// Migration is atomic per item only. On cancellation the report is
    /// tagged cancelled; migrated items stay migrated and the caller must
    /// discard the lists.
    pub fn rekey_dataset(
        &self,
        new_passphrase: &str,
        config: &KeyConfig,
        lists: &mut [&mut VersionedList],
        cancel: &dyn Cancellation,
    ) -> Result<Rekeyed> {
        let hierarchy = self.rekey(new_passphrase, config)?;
        let mut report = BulkReport::default();
        for list in lists.iter_mut() {
            let list_report = list.rekey(hierarchy.cipher_set(), cancel)?;
            report.merge(list_report);
            if report.is_cancelled() {
                break;
            }
        }
        tracing::info!(
            from = %self.id,
            to = %hierarchy.id,
            processed = report.processed,
            changed = report.changed,
            errors = report.errors.len(),
            cancelled = report.is_cancelled(),
            "re-keyed dataset"
        );
        Ok(Rekeyed { hierarchy, report })
    }
}

impl std::fmt::Debug for KeyHierarchy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyHierarchy")
            .field("id", &self.id)
            .field("keys", &self.wrapped_keys.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PASS: &str = "correct-horse-battery";

    fn config() -> KeyConfig {
        KeyConfig::default().with_kdf(KdfParams::insecure_fast())
    }

    #[test]
    fn test_create_registers_every_algorithm() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let algorithms: Vec<_> = hierarchy.cipher_set().algorithms().collect();
        assert_eq!(algorithms, config().algorithms);
        assert_eq!(hierarchy.wrapped_keys().len(), 3);
    }

    #[test]
    fn test_weak_passphrase_rejected() {
        assert!(KeyHierarchy::create("short", &config()).is_err());
    }

    #[test]
    fn test_open_with_correct_passphrase_restores_keys() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let sealed = hierarchy.cipher_set().encrypt(b"net worth").unwrap();

        let reopened = KeyHierarchy::open(&hierarchy.to_stored(), PASS).unwrap();
        assert_eq!(reopened.id(), hierarchy.id());
        assert!(reopened.cipher_set().same_keys(hierarchy.cipher_set()));
        assert_eq!(reopened.cipher_set().decrypt(&sealed).unwrap(), b"net worth");
    }

    #[test]
    fn test_open_with_wrong_passphrase_fails() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let result = KeyHierarchy::open(&hierarchy.to_stored(), "wrong-passphrase");
        assert!(matches!(result, Err(TallyError::IncorrectPassphrase)));
    }

    #[test]
    fn test_resolver_retries_then_succeeds() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let mut attempts = Vec::new();
        let mut resolver = |request: &PassphraseRequest| {
            attempts.push(request.attempt);
            let answer = if request.attempt < 2 { "nope-nope-nope" } else { PASS };
            Some(secrecy::SecretString::from(answer.to_string()))
        };
        let reopened = KeyHierarchy::resolve(&hierarchy.to_stored(), &mut resolver).unwrap();
        assert_eq!(reopened.id(), hierarchy.id());
        assert_eq!(attempts, vec![1, 2]);
    }

    #[test]
    fn test_resolver_declining_cancels() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let mut resolver = |_: &PassphraseRequest| -> Option<secrecy::SecretString> { None };
        let result = KeyHierarchy::resolve(&hierarchy.to_stored(), &mut resolver);
        assert!(matches!(result, Err(TallyError::Cancelled)));
    }

    #[test]
    fn test_truncated_hash_is_data_error() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let mut stored = hierarchy.to_stored();
        stored.hash.truncate(10);
        assert!(matches!(
            KeyHierarchy::open(&stored, PASS),
            Err(TallyError::Data(_))
        ));
    }

    #[test]
    fn test_oversized_kdf_params_are_data_errors() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        // Memory, then iterations, in the stored header.
        for offset in [1usize, 5] {
            let mut stored = hierarchy.to_stored();
            stored.hash[offset..offset + 4].copy_from_slice(&u32::MAX.to_le_bytes());
            assert!(matches!(
                KeyHierarchy::open(&stored, PASS),
                Err(TallyError::Data(_))
            ));
        }
    }

    #[test]
    fn test_rewrap_rejects_oversized_kdf() {
        let mut hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let before = hierarchy.wrapped_hash().to_vec();
        let kdf = KdfParams {
            memory_kib: u32::MAX,
            ..KdfParams::insecure_fast()
        };
        assert!(hierarchy.rewrap("new-passphrase-456", &kdf).is_err());
        assert_eq!(hierarchy.wrapped_hash(), before.as_slice());
    }

    #[test]
    fn test_swapped_wrapped_keys_are_rejected() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let mut stored = hierarchy.to_stored();
        let first = stored.keys[0].wrapped.clone();
        stored.keys[0].wrapped = stored.keys[1].wrapped.clone();
        stored.keys[1].wrapped = first;
        assert!(matches!(
            KeyHierarchy::open(&stored, PASS),
            Err(TallyError::Security(_))
        ));
    }

    #[test]
    fn test_retagged_wrapped_key_is_rejected() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let mut stored = hierarchy.to_stored();
        stored.keys[0].algorithm = Algorithm::Aes256Gcm;
        stored.keys[1].algorithm = Algorithm::ChaCha20Poly1305;
        assert!(matches!(
            KeyHierarchy::open(&stored, PASS),
            Err(TallyError::Security(_))
        ));
    }

    #[test]
    fn test_rewrap_changes_hash_but_not_keys() {
        let mut hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let before = hierarchy.to_stored();
        let sealed = hierarchy.cipher_set().encrypt(b"savings").unwrap();

        hierarchy
            .rewrap("new-passphrase-456", &KdfParams::insecure_fast())
            .unwrap();
        let after = hierarchy.to_stored();
        assert_ne!(before.hash, after.hash);
        assert_ne!(before.keys[0].wrapped, after.keys[0].wrapped);
        assert_eq!(before.keys[0].key_id, after.keys[0].key_id);

        assert!(KeyHierarchy::open(&after, PASS).is_err());
        let reopened = KeyHierarchy::open(&after, "new-passphrase-456").unwrap();
        assert_eq!(reopened.cipher_set().decrypt(&sealed).unwrap(), b"savings");
    }

    #[test]
    fn test_rekey_produces_new_keys() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let rekeyed = hierarchy.rekey("another-passphrase", &config()).unwrap();
        assert_ne!(rekeyed.id(), hierarchy.id());
        assert!(!rekeyed.cipher_set().same_keys(hierarchy.cipher_set()));

        let sealed = rekeyed.cipher_set().encrypt(b"x").unwrap();
        assert!(hierarchy.cipher_set().decrypt(&sealed).is_err());
    }

    #[test]
    fn test_clone_for_dataset_shares_keys() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let mut clone = hierarchy.clone_for_dataset();
        assert_ne!(clone.id(), hierarchy.id());
        assert!(Arc::ptr_eq(clone.cipher_set(), hierarchy.cipher_set()));
        assert_eq!(clone.wrapped_hash(), hierarchy.wrapped_hash());

        clone
            .rewrap("clone-passphrase", &KdfParams::insecure_fast())
            .unwrap();
        assert_ne!(clone.wrapped_hash(), hierarchy.wrapped_hash());
        assert!(KeyHierarchy::open(&hierarchy.to_stored(), PASS).is_ok());
    }

    #[test]
    fn test_stored_hierarchy_serializes() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let json = serde_json::to_string(&hierarchy.to_stored()).unwrap();
        let back: StoredHierarchy = serde_json::from_str(&json).unwrap();
        assert_eq!(back, hierarchy.to_stored());
    }

    #[test]
    fn test_debug_hides_key_material() {
        let hierarchy = KeyHierarchy::create(PASS, &config()).unwrap();
        let debug_output = format!("{:?}", hierarchy);
        assert!(debug_output.contains("KeyHierarchy"));
        assert!(!debug_output.contains("wrap"));
    }
}
