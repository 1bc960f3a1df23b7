//! Cryptographic operations for Tally.
//!
//! This module provides the key wrapping hierarchy and field ciphers using
//! well-audited libraries:
//! - **Argon2id**: memory-hard derivation of the master key
//! - **HKDF-SHA256**: purpose-bound sub-keys of the master key
//! - **ChaCha20-Poly1305 / AES-256-GCM**: AEAD field and key-wrap ciphers
//! - **Age**: X25519 identities as an additional field cipher
//!
//! ## Security Model
//!
//! - The passphrase only ever protects the symmetric keys, never field data
//! - Raw keys live in memory only and are zeroized on drop
//! - Ciphertext carries an explicit algorithm tag; no trial decryption
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft of a persisted dataset
//! - Offline brute-force attacks on the passphrase
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger
//! - Access to an unlocked session / memory

pub mod age_key;
pub mod cipher;
pub mod hierarchy;
pub mod key;
pub mod passphrase;

pub use cipher::{Algorithm, CipherSet, Sealed, SymmetricKeySet};
pub use hierarchy::{KeyHierarchy, Rekeyed, StoredHierarchy, WrappedKey, MAX_PASSPHRASE_ATTEMPTS};
pub use key::{derive_key, DerivedKey};
pub use passphrase::{validate_passphrase, KnownPassphrase, PassphraseRequest, PassphraseResolver};
