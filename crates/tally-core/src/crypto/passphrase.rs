//! Passphrase validation and resolution.

use secrecy::SecretString;
use uuid::Uuid;

use crate::error::{Result, TallyError};

/// Minimum passphrase length in characters.
const MIN_PASSPHRASE_LENGTH: usize = 8;

/// Validate a new passphrase meets minimum security requirements.
///
/// Only applied when a passphrase is being set; existing hierarchies are
/// opened with whatever passphrase they were created under.
pub fn validate_passphrase(passphrase: &str) -> Result<()> {
    if passphrase.trim().is_empty() {
        return Err(TallyError::InvalidInput(
            "Passphrase cannot be empty".to_string(),
        ));
    }

    let length = passphrase.chars().count();
    if length < MIN_PASSPHRASE_LENGTH {
        return Err(TallyError::InvalidInput(format!(
            "Passphrase must be at least {} characters (got {})",
            MIN_PASSPHRASE_LENGTH, length
        )));
    }

    Ok(())
}

/// What a resolver is being asked for.
#[derive(Debug, Clone, Copy)]
pub struct PassphraseRequest {
    /// Hierarchy whose wrapped hash needs unlocking.
    pub hierarchy_id: Uuid,

    /// 1-based attempt number; > 1 means the previous answer was rejected.
    pub attempt: u32,
}

/// Supplies a passphrase when a stored hash must be unwrapped.
///
/// Returning `None` abandons the operation with `TallyError::Cancelled`.
pub trait PassphraseResolver {
    fn resolve(&mut self, request: &PassphraseRequest) -> Option<SecretString>;
}

impl<F> PassphraseResolver for F
where
    F: FnMut(&PassphraseRequest) -> Option<SecretString>,
{
    fn resolve(&mut self, request: &PassphraseRequest) -> Option<SecretString> {
        self(request)
    }
}

/// Resolver for a passphrase the caller already knows. Answers once.
pub struct KnownPassphrase(Option<SecretString>);

impl KnownPassphrase {
    pub fn new(passphrase: &str) -> Self {
        Self(Some(SecretString::from(passphrase.to_string())))
    }
}

impl PassphraseResolver for KnownPassphrase {
    fn resolve(&mut self, _request: &PassphraseRequest) -> Option<SecretString> {
        self.0.take()
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn test_valid_passphrase() {
        assert!(validate_passphrase("my-secure-passphrase-123").is_ok());
        assert!(validate_passphrase("longer passphrase with spaces and symbols!@#").is_ok());
    }

    #[test]
    fn test_passphrase_too_short() {
        let result = validate_passphrase("short");
        assert!(result
            .unwrap_err()
            .to_string()
            .contains("at least 8 characters"));
    }

    #[test]
    fn test_passphrase_empty() {
        assert!(validate_passphrase("").is_err());
        assert!(validate_passphrase("   ").is_err());
        assert!(validate_passphrase("\n\t").is_err());
    }

    #[test]
    fn test_passphrase_counts_characters() {
        // 8 characters, more than 8 bytes
        assert!(validate_passphrase("ééééàààà").is_ok());
    }

    #[test]
    fn test_known_passphrase_answers_once() {
        let mut resolver = KnownPassphrase::new("secret-passphrase");
        let request = PassphraseRequest {
            hierarchy_id: Uuid::new_v4(),
            attempt: 1,
        };
        let first = resolver.resolve(&request).unwrap();
        assert_eq!(first.expose_secret(), "secret-passphrase");
        assert!(resolver.resolve(&request).is_none());
    }

    #[test]
    fn test_closure_resolver() {
        let mut calls = 0;
        let mut resolver = |request: &PassphraseRequest| {
            calls += 1;
            (request.attempt < 3).then(|| SecretString::from("pw".to_string()))
        };
        let request = PassphraseRequest {
            hierarchy_id: Uuid::nil(),
            attempt: 3,
        };
        assert!(PassphraseResolver::resolve(&mut resolver, &request).is_none());
        assert_eq!(calls, 1);
    }
}
