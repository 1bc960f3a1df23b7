//! Encrypted field cells.
//!
//! An [`EncryptedField`] keeps the plaintext value (decrypted lazily on first
//! access) next to its ciphertext. Setting a value marks the ciphertext
//! stale; [`EncryptedField::materialize`] recomputes it before persistence.
//! Comparisons always use plaintext since ciphertext carries a random nonce.

use std::fmt;
use std::sync::Arc;

use once_cell::unsync::OnceCell;
use zeroize::Zeroizing;

use crate::crypto::{CipherSet, Sealed};
use crate::difference::Difference;
use crate::error::{Result, TallyError};
use crate::value::Value;

#[derive(Clone)]
pub struct EncryptedField {
    plaintext: OnceCell<Value>,
    /// `None` while stale.
    sealed: Option<Sealed>,
    cipher: Arc<CipherSet>,
}

fn require_keys(cipher: &CipherSet) -> Result<()> {
    if cipher.is_empty() {
        return Err(TallyError::IllegalState(
            "Cipher set has no keys; cannot protect a field".to_string(),
        ));
    }
    Ok(())
}

impl EncryptedField {
    /// Protect a new value under `cipher`. Ciphertext is computed on
    /// [`materialize`](Self::materialize).
    pub fn new(cipher: &Arc<CipherSet>, value: Value) -> Result<Self> {
        require_keys(cipher)?;
        Ok(Self {
            plaintext: OnceCell::with_value(value),
            sealed: None,
            cipher: Arc::clone(cipher),
        })
    }

    /// A loaded field whose plaintext has not been decrypted yet.
    pub fn from_sealed(cipher: &Arc<CipherSet>, sealed: Sealed) -> Self {
        Self {
            plaintext: OnceCell::new(),
            sealed: Some(sealed),
            cipher: Arc::clone(cipher),
        }
    }

    /// The plaintext value, decrypting on first access.
    pub fn get(&self) -> Result<&Value> {
        self.plaintext.get_or_try_init(|| {
            let sealed = self.sealed.as_ref().ok_or_else(|| {
                TallyError::IllegalState("Encrypted field has neither value nor ciphertext".to_string())
            })?;
            let bytes = Zeroizing::new(self.cipher.decrypt(sealed)?);
            serde_json::from_slice(&bytes)
                .map_err(|e| TallyError::Data(format!("Malformed encrypted value: {}", e)))
        })
    }

    pub fn is_decrypted(&self) -> bool {
        self.plaintext.get().is_some()
    }

    /// Replace the plaintext; the ciphertext becomes stale.
    pub fn set(&mut self, value: Value) -> Result<()> {
        require_keys(&self.cipher)?;
        self.plaintext = OnceCell::with_value(value);
        self.sealed = None;
        Ok(())
    }

    pub fn is_stale(&self) -> bool {
        self.sealed.is_none()
    }

    /// Ciphertext for storage, if current.
    pub fn sealed(&self) -> Option<&Sealed> {
        self.sealed.as_ref()
    }

    /// Recompute ciphertext if stale and return it.
    pub fn materialize(&mut self) -> Result<&Sealed> {
        if self.sealed.is_none() {
            let bytes = Zeroizing::new(serde_json::to_vec(self.get()?)?);
            self.sealed = Some(self.cipher.encrypt(&bytes)?);
        }
        self.sealed
            .as_ref()
            .ok_or_else(|| TallyError::IllegalState("Ciphertext missing after encryption".to_string()))
    }

    pub fn cipher_set(&self) -> &Arc<CipherSet> {
        &self.cipher
    }

    /// Re-encrypt under `target`, replacing ciphertext and cipher reference.
    pub fn rekey(&mut self, target: &Arc<CipherSet>) -> Result<()> {
        require_keys(target)?;
        let value = self.get()?.clone();
        let bytes = Zeroizing::new(serde_json::to_vec(&value)?);
        let sealed = target.encrypt(&bytes)?;
        self.plaintext = OnceCell::with_value(value);
        self.sealed = Some(sealed);
        self.cipher = Arc::clone(target);
        Ok(())
    }

    /// Plaintext-only copy (no ciphertext) used by history snapshots.
    pub(crate) fn detached(&self) -> Result<Self> {
        Ok(Self {
            plaintext: OnceCell::with_value(self.get()?.clone()),
            sealed: None,
            cipher: Arc::clone(&self.cipher),
        })
    }

    /// Compare on plaintext; equal values under different keys are a
    /// security-only change.
    pub fn difference(&self, other: &EncryptedField) -> Result<Difference> {
        if self.get()? != other.get()? {
            return Ok(Difference::ValueChanged);
        }
        if Arc::ptr_eq(&self.cipher, &other.cipher) || self.cipher.same_keys(&other.cipher) {
            Ok(Difference::Identical)
        } else {
            Ok(Difference::SecurityChanged)
        }
    }
}

impl fmt::Debug for EncryptedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedField")
            .field("plaintext", &"[REDACTED]")
            .field("decrypted", &self.is_decrypted())
            .field("stale", &self.is_stale())
            .finish()
    }
}
