//! Per-application charm configuration
//!
//! The operator reads an optional TOML file at startup. Every key is
//! optional; an absent file yields the defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct CharmConfig {
    /// Identifier (`secret:<name>`) of the secret holding the chaoscenter
    /// `admin_password` and `charm_password`
    #[serde(default)]
    pub user_secret_id: Option<String>,
}

impl CharmConfig {
    pub fn from_toml(raw: &str) -> Result<Self> {
        Ok(toml::from_str(raw)?)
    }

    /// Load from `path`, falling back to defaults when the file does not exist
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            debug!("Charm config {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_user_secret_id() {
        let config = CharmConfig::from_toml(r#"user-secret-id = "secret:litmus-users""#).unwrap();
        assert_eq!(config.user_secret_id.as_deref(), Some("secret:litmus-users"));
    }

    #[test]
    fn test_empty_file_is_default() {
        assert_eq!(CharmConfig::from_toml("").unwrap(), CharmConfig::default());
    }

    #[test]
    fn test_unknown_keys_rejected() {
        assert!(CharmConfig::from_toml("log-level = \"debug\"").is_err());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = CharmConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config, CharmConfig::default());
    }
}
