/// Exit codes for the Tally CLI.
///
/// Follows Unix conventions where 0 is success, 1 is general error,
/// 2 is usage error (handled by clap), and higher codes are specific.
pub mod exit_codes {
    /// Dataset or record not found
    pub const NOT_FOUND: i32 = 3;

    /// Invalid user input
    pub const INVALID_INPUT: i32 = 4;

    /// Authentication failed (wrong passphrase)
    pub const AUTH_FAILED: i32 = 5;

    /// Bulk operation was cancelled or left incomplete
    pub const CANCELLED: i32 = 6;
}

/// Environment variable holding the current passphrase.
pub const PASSPHRASE_ENV: &str = "TALLY_PASSPHRASE";

/// Environment variable holding the replacement passphrase for `passwd` / `rekey`.
pub const NEW_PASSPHRASE_ENV: &str = "TALLY_NEW_PASSPHRASE";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "TALLY_CONFIG";

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "TALLY_LOG";
