//! Credential record persisted to a local JSON file
//!
//! ```json
//! {"username": "...", "password": "...", "access_token": "...", "expires": "Tue, 20 Dec 2022 15:04:05 GMT"}
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, warn};

use crate::token::Token;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CredentialRecord {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    /// Cached token expiry in the login endpoint's format
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl CredentialRecord {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Default::default()
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read credentials from {}", path.display()))?;
        let record: Self = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse credentials in {}", path.display()))?;
        debug!("Loaded credentials for '{}' from {}", record.username, path.display());
        Ok(record)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
            .with_context(|| format!("Failed to write credentials to {}", path.display()))?;
        debug!("Saved credentials to {}", path.display());
        Ok(())
    }

    /// Cached token, if both halves are present and the expiry parses
    pub fn token(&self) -> Option<Token> {
        let access_token = self.access_token.as_ref().filter(|t| !t.is_empty())?;
        let raw = self.expires.as_ref()?;
        match Token::parse_expiry(raw) {
            Ok(expires) => Some(Token::new(access_token.clone(), expires)),
            Err(e) => {
                warn!("Ignoring cached token: {}", e);
                None
            }
        }
    }

    pub fn with_token(mut self, token: &Token) -> Self {
        self.access_token = Some(token.access_token.clone());
        self.expires = Some(token.format_expiry());
        self
    }

    /// API key for key-based providers; older files keep it under `password`
    pub fn api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .or(Some(self.password.as_str()))
            .filter(|k| !k.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_save_and_load_with_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("iol.json");

        let expires = Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap();
        let record = CredentialRecord::new("user", "secret").with_token(&Token::new("tok", expires));
        record.save(&path).unwrap();

        let loaded = CredentialRecord::load(&path).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.expires.as_deref(), Some("Wed, 01 May 2024 10:00:00 GMT"));
        assert_eq!(loaded.token(), Some(Token::new("tok", expires)));
    }

    #[test]
    fn test_missing_or_bad_token_fields() {
        let record: CredentialRecord =
            serde_json::from_str(r#"{"username":"u","password":"p"}"#).unwrap();
        assert!(record.token().is_none());

        let record: CredentialRecord = serde_json::from_str(
            r#"{"username":"u","password":"p","access_token":"x","expires":"soon"}"#,
        )
        .unwrap();
        assert!(record.token().is_none());
    }

    #[test]
    fn test_api_key_falls_back_to_password() {
        let record: CredentialRecord = serde_json::from_str(r#"{"password":"fh-key"}"#).unwrap();
        assert_eq!(record.api_key(), Some("fh-key"));

        let empty = CredentialRecord::default();
        assert_eq!(empty.api_key(), None);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(CredentialRecord::load(&dir.path().join("nope.json")).is_err());
    }
}
