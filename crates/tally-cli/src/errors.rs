//! CLI error types for structured error handling.
//!
//! Typed errors map to specific exit codes so scripts can tell a wrong
//! passphrase from a missing dataset.

use std::fmt;

use tally_core::{ErrorKind, TallyError};

/// CLI-specific errors with associated exit codes.
#[derive(Debug)]
pub enum CliError {
    /// Resource not found (dataset, config, record)
    NotFound { message: String, hint: String },

    /// Authentication failed (wrong passphrase, too many attempts)
    AuthFailed {
        message: String,
        hint: Option<String>,
    },

    /// Invalid user input
    InvalidInput(String),

    /// A bulk operation stopped early or left failures behind
    Incomplete(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::NotFound { message, hint } => {
                write!(f, "{}\n{}", message, hint)
            }
            CliError::AuthFailed { message, hint } => {
                if let Some(h) = hint {
                    write!(f, "{}\n{}", message, h)
                } else {
                    write!(f, "{}", message)
                }
            }
            CliError::InvalidInput(message) | CliError::Incomplete(message) => {
                write!(f, "{}", message)
            }
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Create a NotFound error with message and hint.
    pub fn not_found(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CliError::NotFound {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Create an AuthFailed error with message and hint.
    pub fn auth_failed_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CliError::AuthFailed {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    /// Create an InvalidInput error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        CliError::InvalidInput(message.into())
    }

    /// Create an Incomplete error.
    pub fn incomplete(message: impl Into<String>) -> Self {
        CliError::Incomplete(message.into())
    }

    /// Translate a core error that has a dedicated exit code.
    pub fn from_core(error: &TallyError) -> Option<Self> {
        match error.kind() {
            ErrorKind::Security if matches!(error, TallyError::IncorrectPassphrase) => {
                Some(CliError::auth_failed_with_hint(
                    error.to_string(),
                    format!("Hint: Check {} or retype the passphrase.", super::constants::PASSPHRASE_ENV),
                ))
            }
            ErrorKind::InvalidInput => Some(CliError::invalid_input(error.to_string())),
            ErrorKind::NotFound => Some(CliError::not_found(
                error.to_string(),
                "Hint: Run `tally show <DATASET>` to list record ids.",
            )),
            ErrorKind::Cancelled => Some(CliError::incomplete(error.to_string())),
            _ => None,
        }
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        use super::constants::exit_codes;
        match self {
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::AuthFailed { .. } => exit_codes::AUTH_FAILED,
            CliError::InvalidInput(_) => exit_codes::INVALID_INPUT,
            CliError::Incomplete(_) => exit_codes::CANCELLED,
        }
    }

    /// Print error message to stderr and exit with appropriate code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);
        std::process::exit(self.exit_code())
    }
}
