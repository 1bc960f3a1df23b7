//! Passphrase acquisition: environment first, then an interactive prompt.

use std::io::{self, IsTerminal};

use dialoguer::Password;
use secrecy::SecretString;
use tally_core::crypto::{validate_passphrase, PassphraseRequest, PassphraseResolver};
use zeroize::Zeroizing;

use crate::constants::{NEW_PASSPHRASE_ENV, PASSPHRASE_ENV};
use crate::errors::CliError;

fn from_env(name: &str) -> Option<Zeroizing<String>> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(Zeroizing::new)
}

/// Answers unlock requests from the environment or a TTY prompt.
///
/// Passphrases taken from the environment are offered once each, in order;
/// once they are all rejected the resolver declines instead of prompting.
pub struct PromptResolver {
    env: Vec<Zeroizing<String>>,
    env_supplied: bool,
}

impl PromptResolver {
    /// Resolver reading `TALLY_PASSPHRASE`.
    pub fn new() -> anyhow::Result<Self> {
        Self::with_env(&[PASSPHRASE_ENV])
    }

    pub fn with_env(names: &[&str]) -> anyhow::Result<Self> {
        let mut env: Vec<_> = names.iter().filter_map(|name| from_env(name)).collect();
        if env.is_empty() && !io::stdin().is_terminal() {
            return Err(anyhow::anyhow!(
                "No passphrase provided and no TTY available. Set {}.",
                PASSPHRASE_ENV
            ));
        }
        env.reverse();
        Ok(Self {
            env_supplied: !env.is_empty(),
            env,
        })
    }
}

impl PassphraseResolver for PromptResolver {
    fn resolve(&mut self, request: &PassphraseRequest) -> Option<SecretString> {
        if let Some(value) = self.env.pop() {
            return Some(SecretString::from(value.to_string()));
        }
        if self.env_supplied {
            return None;
        }
        if request.attempt > 1 {
            eprintln!("Incorrect passphrase (attempt {})", request.attempt);
        }
        Password::new()
            .with_prompt("Passphrase")
            .interact()
            .ok()
            .map(SecretString::from)
    }
}

/// Passphrase for a new hierarchy, from `env_name` or a confirmed prompt.
fn prompt_new(env_name: &str, prompt: &str) -> anyhow::Result<Zeroizing<String>> {
    let passphrase = match from_env(env_name) {
        Some(value) => value,
        None => {
            if !io::stdin().is_terminal() {
                return Err(anyhow::anyhow!(
                    "No passphrase provided and no TTY available. Set {}.",
                    env_name
                ));
            }
            Password::new()
                .with_prompt(prompt)
                .with_confirmation("Confirm passphrase", "Passphrases do not match")
                .interact()
                .map(Zeroizing::new)
                .map_err(|e| anyhow::anyhow!("Failed to read passphrase: {}", e))?
        }
    };
    validate_passphrase(&passphrase).map_err(|e| CliError::invalid_input(e.to_string()))?;
    Ok(passphrase)
}

/// Passphrase for `init`, read like an unlock passphrase.
pub fn init_passphrase() -> anyhow::Result<Zeroizing<String>> {
    prompt_new(PASSPHRASE_ENV, "Enter passphrase")
}

/// Replacement passphrase for `passwd` and `rekey`.
pub fn new_passphrase() -> anyhow::Result<Zeroizing<String>> {
    prompt_new(NEW_PASSPHRASE_ENV, "New passphrase")
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use uuid::Uuid;

    fn request(attempt: u32) -> PassphraseRequest {
        PassphraseRequest {
            hierarchy_id: Uuid::nil(),
            attempt,
        }
    }

    #[test]
    fn test_env_values_offered_in_order_then_declined() {
        let mut resolver = PromptResolver {
            env: vec![Zeroizing::new("second".to_string()), Zeroizing::new("first".to_string())],
            env_supplied: true,
        };
        assert_eq!(resolver.resolve(&request(1)).unwrap().expose_secret(), "first");
        assert_eq!(resolver.resolve(&request(2)).unwrap().expose_secret(), "second");
        assert!(resolver.resolve(&request(3)).is_none());
    }
}
