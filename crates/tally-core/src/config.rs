//! Key hierarchy configuration.
//!
//! Callers normally load this from their own settings file; every field has
//! a default so an empty section is valid.

use serde::{Deserialize, Serialize};

use crate::crypto::Algorithm;
use crate::error::{Result, TallyError};

/// Argon2id defaults (memory-hard, resistant to GPU attacks):
/// - Memory: 64 MB (64 * 1024 KB)
/// - Iterations: 3
/// - Parallelism: 1
const DEFAULT_MEMORY_KIB: u32 = 64 * 1024;
const DEFAULT_ITERATIONS: u32 = 3;
const DEFAULT_PARALLELISM: u32 = 1;

/// Argon2 requires at least 8 KiB per lane.
const MIN_MEMORY_KIB_PER_LANE: u32 = 8;

/// Upper bounds; stored parameters beyond these are treated as corrupt.
pub const MAX_MEMORY_KIB: u32 = 4 * 1024 * 1024;
pub const MAX_ITERATIONS: u32 = 64;
pub const MAX_PARALLELISM: u32 = 64;

/// Parameters for deriving the master key from a passphrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            memory_kib: DEFAULT_MEMORY_KIB,
            iterations: DEFAULT_ITERATIONS,
            parallelism: DEFAULT_PARALLELISM,
        }
    }
}

impl KdfParams {
    /// Cheap parameters for tests and tooling. Never use for real data.
    pub fn insecure_fast() -> Self {
        Self {
            memory_kib: MIN_MEMORY_KIB_PER_LANE,
            iterations: 1,
            parallelism: 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.iterations == 0 {
            return Err(TallyError::InvalidInput(
                "KDF iterations must be at least 1".to_string(),
            ));
        }
        if self.parallelism == 0 {
            return Err(TallyError::InvalidInput(
                "KDF parallelism must be at least 1".to_string(),
            ));
        }
        if self.memory_kib < MIN_MEMORY_KIB_PER_LANE * self.parallelism {
            return Err(TallyError::InvalidInput(format!(
                "KDF memory must be at least {} KiB per lane",
                MIN_MEMORY_KIB_PER_LANE
            )));
        }
        if self.memory_kib > MAX_MEMORY_KIB {
            return Err(TallyError::InvalidInput(format!(
                "KDF memory must be at most {} KiB",
                MAX_MEMORY_KIB
            )));
        }
        if self.iterations > MAX_ITERATIONS {
            return Err(TallyError::InvalidInput(format!(
                "KDF iterations must be at most {}",
                MAX_ITERATIONS
            )));
        }
        if self.parallelism > MAX_PARALLELISM {
            return Err(TallyError::InvalidInput(format!(
                "KDF parallelism must be at most {}",
                MAX_PARALLELISM
            )));
        }
        Ok(())
    }
}

/// Settings used when creating or rotating a key hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyConfig {
    pub kdf: KdfParams,

    /// Algorithms to generate keys for. The first one is used to encrypt.
    pub algorithms: Vec<Algorithm>,
}

impl Default for KeyConfig {
    fn default() -> Self {
        Self {
            kdf: KdfParams::default(),
            algorithms: vec![
                Algorithm::ChaCha20Poly1305,
                Algorithm::Aes256Gcm,
                Algorithm::AgeX25519,
            ],
        }
    }
}

impl KeyConfig {
    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }

    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.kdf.validate()?;
        if self.algorithms.is_empty() {
            return Err(TallyError::InvalidInput(
                "At least one algorithm is required".to_string(),
            ));
        }
        for (index, algorithm) in self.algorithms.iter().enumerate() {
            if self.algorithms[..index].contains(algorithm) {
                return Err(TallyError::InvalidInput(format!(
                    "Algorithm listed twice: {}",
                    algorithm
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(KeyConfig::default().validate().is_ok());
        assert!(KdfParams::insecure_fast().validate().is_ok());
    }

    #[test]
    fn test_empty_algorithms_rejected() {
        let config = KeyConfig::default().with_algorithms(Vec::new());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_algorithm_rejected() {
        let config = KeyConfig::default()
            .with_algorithms(vec![Algorithm::Aes256Gcm, Algorithm::Aes256Gcm]);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("listed twice"));
    }

    #[test]
    fn test_memory_floor() {
        let kdf = KdfParams {
            memory_kib: 8,
            iterations: 1,
            parallelism: 2,
        };
        assert!(kdf.validate().is_err());
    }

    #[test]
    fn test_upper_bounds() {
        let at_limit = KdfParams {
            memory_kib: MAX_MEMORY_KIB,
            iterations: MAX_ITERATIONS,
            parallelism: MAX_PARALLELISM,
        };
        assert!(at_limit.validate().is_ok());

        for kdf in [
            KdfParams { memory_kib: u32::MAX, ..KdfParams::default() },
            KdfParams { iterations: u32::MAX, ..KdfParams::default() },
            KdfParams { parallelism: MAX_PARALLELISM + 1, ..KdfParams::default() },
        ] {
            assert!(matches!(kdf.validate(), Err(TallyError::InvalidInput(_))));
        }
    }

    #[test]
    fn test_partial_section_uses_defaults() {
        let config: KeyConfig =
            serde_json::from_str(r#"{"kdf": {"iterations": 5}}"#).unwrap();
        assert_eq!(config.kdf.iterations, 5);
        assert_eq!(config.kdf.memory_kib, DEFAULT_MEMORY_KIB);
        assert_eq!(config.algorithms.len(), 3);
    }
}
