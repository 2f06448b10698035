//! Configuration management for castbridge
//!
//! Persists the configured accounts keyed by entry id. Each entry carries
//! the web-player cookies, optional OAuth material, and the default-account
//! flag. Config is stored at ~/.config/castbridge/config.toml

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use uuid::Uuid;

/// Persisted credentials and flags for one account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountEntry {
    /// Web-player session cookie
    pub sp_dc: String,
    /// Web-player session cookie
    pub sp_key: String,
    /// OAuth refresh token for the Web API session, when authorized
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// OAuth client id matching the refresh token
    #[serde(default)]
    pub client_id: Option<String>,
    /// Account used when a service call names none
    #[serde(default)]
    pub is_default: bool,
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Configured accounts keyed by entry id
    #[serde(default)]
    pub accounts: BTreeMap<String, AccountEntry>,
}

impl Config {
    /// Get config file path (~/.config/castbridge/config.toml)
    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("castbridge").join("config.toml"))
    }

    /// Load config from file, or return default if not found
    pub fn load() -> Self {
        Self::path()
            .and_then(|p| std::fs::read_to_string(p).ok())
            .and_then(|s| toml::from_str(&s).ok())
            .unwrap_or_default()
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or_else(|| anyhow::anyhow!("Could not determine config path"))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }

    /// Register a new account entry under a fresh entry id. The first
    /// account ever added becomes the default.
    pub fn add_account(&mut self, mut entry: AccountEntry) -> String {
        if self.accounts.is_empty() {
            entry.is_default = true;
        }
        let entry_id = Uuid::new_v4().to_string();
        self.accounts.insert(entry_id.clone(), entry);
        entry_id
    }

    /// The default account entry, when one is flagged
    pub fn default_entry(&self) -> Option<(&String, &AccountEntry)> {
        self.accounts.iter().find(|(_, entry)| entry.is_default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default_is_empty() {
        let config = Config::default();
        assert!(config.accounts.is_empty());
        assert!(config.default_entry().is_none());
    }

    #[test]
    fn test_first_added_account_becomes_default() {
        let mut config = Config::default();
        let first = config.add_account(AccountEntry {
            sp_dc: "dc".into(),
            sp_key: "key".into(),
            ..AccountEntry::default()
        });
        let second = config.add_account(AccountEntry {
            sp_dc: "dc2".into(),
            sp_key: "key2".into(),
            ..AccountEntry::default()
        });

        assert_ne!(first, second);
        let (default_id, _) = config.default_entry().unwrap();
        assert_eq!(default_id, &first);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let mut config = Config::default();
        config.add_account(AccountEntry {
            sp_dc: "dc".into(),
            sp_key: "key".into(),
            refresh_token: Some("refresh".into()),
            client_id: Some("client".into()),
            is_default: false,
        });

        let encoded = toml::to_string_pretty(&config).unwrap();
        let decoded: Config = toml::from_str(&encoded).unwrap();
        assert_eq!(decoded.accounts.len(), 1);
        let entry = decoded.accounts.values().next().unwrap();
        assert_eq!(entry.sp_dc, "dc");
        assert!(entry.is_default);
        assert_eq!(entry.refresh_token.as_deref(), Some("refresh"));
    }
}
