//! CLI configuration file handling.
//!
//! The config lives at `$TALLY_CONFIG` or `$XDG_CONFIG_HOME/tally/config.toml`
//! (falling back to `~/.config`). A missing file means defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tally_core::KeyConfig;

use crate::constants::CONFIG_ENV;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TallyConfig {
    /// Settings for new or rotated key hierarchies.
    pub keys: KeyConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Show a progress bar during re-keying.
    pub progress: bool,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self { progress: true }
    }
}

/// Resolve the config path from the environment.
pub fn config_path() -> anyhow::Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    Ok(xdg_config_dir()?.join("tally").join("config.toml"))
}

pub fn load_config() -> anyhow::Result<TallyConfig> {
    let path = config_path()?;
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(TallyConfig::default());
    }
    read_config(&path)
}

pub fn read_config(path: &Path) -> anyhow::Result<TallyConfig> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("Failed to read config {}: {}", path.display(), e))?;
    let config: TallyConfig = toml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("Invalid config {}: {}", path.display(), e))?;
    config
        .keys
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid [keys] in {}: {}", path.display(), e))?;
    Ok(config)
}

fn xdg_config_dir() -> anyhow::Result<PathBuf> {
    if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
        if !dir.trim().is_empty() {
            return Ok(PathBuf::from(dir));
        }
    }
    let home = std::env::var("HOME")
        .map_err(|_| anyhow::anyhow!("HOME is not set; set {} to a config file", CONFIG_ENV))?;
    Ok(PathBuf::from(home).join(".config"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tally_core::{Algorithm, KdfParams};
    use tempfile::tempdir;

    #[test]
    fn test_read_partial_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[keys]\nalgorithms = [\"aes256_gcm\"]\n\n[keys.kdf]\nmemory_kib = 8\niterations = 1\nparallelism = 1\n",
        )
        .unwrap();

        let config = read_config(&path).unwrap();
        assert_eq!(config.keys.algorithms, vec![Algorithm::Aes256Gcm]);
        assert_eq!(config.keys.kdf, KdfParams::insecure_fast());
        assert!(config.ui.progress);
    }

    #[test]
    fn test_invalid_keys_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[keys]\nalgorithms = []\n").unwrap();

        let err = read_config(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid [keys]"));
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = TallyConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: TallyConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }
}
