//! Symmetric key sets and the aggregated cipher set.
//!
//! AEAD payload layout (AES-256-GCM and ChaCha20-Poly1305):
//!
//! ```text
//! [NONCE(12)][CIPHERTEXT(N)][TAG(16)]
//! ```
//!
//! Age payloads are stored as produced by the Age library.

use std::fmt;
use std::sync::Arc;

use aes_gcm::Aes256Gcm;
use chacha20poly1305::aead::{self, Aead, KeyInit, Payload};
use chacha20poly1305::ChaCha20Poly1305;
use secrecy::{ExposeSecret, SecretSlice};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use zeroize::Zeroizing;

use super::age_key::AgeKey;
use super::key::{random_array, KEY_LENGTH};
use crate::error::{Result, TallyError};

/// AEAD nonce length (96-bit).
pub(crate) const NONCE_LEN: usize = 12;

/// AEAD tag length (128-bit).
pub(crate) const TAG_LEN: usize = 16;

/// Encryption algorithm, stored as an explicit tag next to ciphertext.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Aes256Gcm,
    ChaCha20Poly1305,
    AgeX25519,
}

impl Algorithm {
    pub fn tag(self) -> u8 {
        match self {
            Algorithm::Aes256Gcm => 1,
            Algorithm::ChaCha20Poly1305 => 2,
            Algorithm::AgeX25519 => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            1 => Ok(Algorithm::Aes256Gcm),
            2 => Ok(Algorithm::ChaCha20Poly1305),
            3 => Ok(Algorithm::AgeX25519),
            other => Err(TallyError::Security(format!(
                "Unknown algorithm tag: {}",
                other
            ))),
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Aes256Gcm => "aes-256-gcm",
            Algorithm::ChaCha20Poly1305 => "chacha20-poly1305",
            Algorithm::AgeX25519 => "age-x25519",
        };
        f.write_str(name)
    }
}

/// Ciphertext together with the algorithm that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sealed {
    pub algorithm: Algorithm,
    #[serde(with = "crate::codec::base64_bytes")]
    pub bytes: Vec<u8>,
}

/// Seal `data` with an AEAD cipher under a fresh random nonce.
pub(crate) fn aead_seal<A: Aead>(cipher: &A, data: &[u8]) -> Result<Vec<u8>> {
    aead_seal_with(cipher, data, &[])
}

/// Seal `data`, binding `aad` into the tag without storing it.
pub(crate) fn aead_seal_with<A: Aead>(cipher: &A, data: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let nonce: [u8; NONCE_LEN] = random_array()?;
    let ciphertext = cipher
        .encrypt(aead::Nonce::<A>::from_slice(&nonce), Payload { msg: data, aad })
        .map_err(|_| TallyError::Security("Encryption failed".to_string()))?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Open a payload produced by [`aead_seal`].
pub(crate) fn aead_open<A: Aead>(cipher: &A, payload: &[u8]) -> Result<Vec<u8>> {
    aead_open_with(cipher, payload, &[])
}

/// Open a payload produced by [`aead_seal_with`] under the same `aad`.
pub(crate) fn aead_open_with<A: Aead>(cipher: &A, payload: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    if payload.len() < NONCE_LEN + TAG_LEN {
        return Err(TallyError::Security("Ciphertext is truncated".to_string()));
    }
    let (nonce, ciphertext) = payload.split_at(NONCE_LEN);
    cipher
        .decrypt(aead::Nonce::<A>::from_slice(nonce), Payload { msg: ciphertext, aad })
        .map_err(|_| TallyError::Security("Decryption failed".to_string()))
}

enum KeyCipher {
    Aes(Box<Aes256Gcm>),
    ChaCha(Box<ChaCha20Poly1305>),
    Age(AgeKey),
}

/// One symmetric key: raw material (memory only) and its derived cipher.
pub struct SymmetricKeySet {
    key_id: Uuid,
    algorithm: Algorithm,
    raw: SecretSlice<u8>,
    cipher: KeyCipher,
}

impl SymmetricKeySet {
    /// Generate a fresh random key for `algorithm`.
    pub fn generate(algorithm: Algorithm) -> Result<Self> {
        let raw: Zeroizing<Vec<u8>> = match algorithm {
            Algorithm::Aes256Gcm | Algorithm::ChaCha20Poly1305 => {
                Zeroizing::new(random_array::<KEY_LENGTH>()?.to_vec())
            }
            Algorithm::AgeX25519 => AgeKey::generate().to_raw(),
        };
        Self::from_raw(Uuid::new_v4(), algorithm, &raw)
    }

    /// Rebuild a key set from unwrapped raw bytes.
    pub fn from_raw(key_id: Uuid, algorithm: Algorithm, raw: &[u8]) -> Result<Self> {
        let cipher = match algorithm {
            Algorithm::Aes256Gcm => KeyCipher::Aes(Box::new(
                Aes256Gcm::new_from_slice(raw)
                    .map_err(|_| TallyError::Security("Invalid AES key length".to_string()))?,
            )),
            Algorithm::ChaCha20Poly1305 => KeyCipher::ChaCha(Box::new(
                ChaCha20Poly1305::new_from_slice(raw)
                    .map_err(|_| TallyError::Security("Invalid ChaCha key length".to_string()))?,
            )),
            Algorithm::AgeX25519 => KeyCipher::Age(AgeKey::from_raw(raw)?),
        };
        Ok(Self {
            key_id,
            algorithm,
            raw: SecretSlice::from(raw.to_vec()),
            cipher,
        })
    }

    pub fn key_id(&self) -> Uuid {
        self.key_id
    }

    pub fn algorithm(&self) -> Algorithm {
        self.algorithm
    }

    /// Raw key bytes, used only for wrapping.
    pub(crate) fn raw(&self) -> &[u8] {
        self.raw.expose_secret()
    }

    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        match &self.cipher {
            KeyCipher::Aes(cipher) => aead_seal(cipher.as_ref(), data),
            KeyCipher::ChaCha(cipher) => aead_seal(cipher.as_ref(), data),
            KeyCipher::Age(key) => key.encrypt(data),
        }
    }

    pub fn decrypt(&self, payload: &[u8]) -> Result<Vec<u8>> {
        match &self.cipher {
            KeyCipher::Aes(cipher) => aead_open(cipher.as_ref(), payload),
            KeyCipher::ChaCha(cipher) => aead_open(cipher.as_ref(), payload),
            KeyCipher::Age(key) => key.decrypt(payload),
        }
    }
}

impl fmt::Debug for SymmetricKeySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKeySet")
            .field("key_id", &self.key_id)
            .field("algorithm", &self.algorithm)
            .field("raw", &"[REDACTED]")
            .finish()
    }
}

/// The live keys of one hierarchy, selected by algorithm tag.
///
/// The first key is the preferred one for new encryptions. Two cipher sets
/// are equal when they hold the same keys in the same order.
#[derive(Debug, Default)]
pub struct CipherSet {
    keys: Vec<Arc<SymmetricKeySet>>,
}

impl CipherSet {
    pub fn new(keys: Vec<Arc<SymmetricKeySet>>) -> Result<Self> {
        for (index, key) in keys.iter().enumerate() {
            if keys[..index]
                .iter()
                .any(|other| other.algorithm == key.algorithm)
            {
                return Err(TallyError::InvalidInput(format!(
                    "Cipher set holds two keys for {}",
                    key.algorithm
                )));
            }
        }
        Ok(Self { keys })
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[Arc<SymmetricKeySet>] {
        &self.keys
    }

    pub fn algorithms(&self) -> impl Iterator<Item = Algorithm> + '_ {
        self.keys.iter().map(|key| key.algorithm)
    }

    fn key_for(&self, algorithm: Algorithm) -> Result<&SymmetricKeySet> {
        self.keys
            .iter()
            .find(|key| key.algorithm == algorithm)
            .map(|key| key.as_ref())
            .ok_or_else(|| {
                TallyError::Security(format!("No key registered for {}", algorithm))
            })
    }

    fn preferred(&self) -> Result<&SymmetricKeySet> {
        self.keys
            .first()
            .map(|key| key.as_ref())
            .ok_or_else(|| TallyError::IllegalState("Cipher set has no keys".to_string()))
    }

    /// Encrypt with the preferred algorithm.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Sealed> {
        let key = self.preferred()?;
        Ok(Sealed {
            algorithm: key.algorithm,
            bytes: key.encrypt(plaintext)?,
        })
    }

    /// Encrypt with an explicit algorithm.
    pub fn encrypt_with(&self, algorithm: Algorithm, plaintext: &[u8]) -> Result<Sealed> {
        let key = self.key_for(algorithm)?;
        Ok(Sealed {
            algorithm,
            bytes: key.encrypt(plaintext)?,
        })
    }

    /// Decrypt using the key named by the sealed algorithm tag.
    pub fn decrypt(&self, sealed: &Sealed) -> Result<Vec<u8>> {
        self.key_for(sealed.algorithm)?.decrypt(&sealed.bytes)
    }

    /// Whether both sets hold exactly the same keys.
    pub fn same_keys(&self, other: &CipherSet) -> bool {
        self.keys.len() == other.keys.len()
            && self
                .keys
                .iter()
                .zip(&other.keys)
                .all(|(a, b)| a.key_id == b.key_id)
    }
}

impl PartialEq for CipherSet {
    fn eq(&self, other: &Self) -> bool {
        self.same_keys(other)
    }
}

impl Eq for CipherSet {}
