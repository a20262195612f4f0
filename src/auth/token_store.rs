use super::common::write_file_secure;
use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Lifetime assumed when the provider does not say how long a token lives.
pub const FALLBACK_LIFETIME_SECS: i64 = 3600;

/// Access token persisted between sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    /// Expiry in milliseconds since the Unix epoch
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl StoredToken {
    pub fn new(access_token: impl Into<String>, expires_in_secs: Option<i64>, now_ms: i64) -> Self {
        let lifetime = expires_in_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(FALLBACK_LIFETIME_SECS);
        Self {
            access_token: access_token.into(),
            expires_at: now_ms + lifetime * 1000,
            scope: None,
        }
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expires_at
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now().timestamp_millis())
    }

    /// Remaining lifetime in whole seconds (0 once expired).
    pub fn remaining_secs(&self) -> i64 {
        ((self.expires_at - Utc::now().timestamp_millis()) / 1000).max(0)
    }
}

/// Token file next to the config.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the token if it is still usable.
    ///
    /// Expired or unreadable tokens are removed so the next call starts clean.
    pub fn load_valid(&self) -> Result<Option<StoredToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&self.path)
            .with_context(|| format!("failed to read token from {}", self.path.display()))?;

        let token = match serde_json::from_str::<StoredToken>(&raw) {
            Ok(token) if !token.access_token.is_empty() => token,
            Ok(_) | Err(_) => {
                tracing::warn!(path = %self.path.display(), "discarding malformed token file");
                self.clear()?;
                return Ok(None);
            }
        };

        if token.is_expired() {
            tracing::info!("stored Google token expired");
            self.clear()?;
            return Ok(None);
        }
        Ok(Some(token))
    }

    pub async fn save(&self, token: &StoredToken) -> Result<()> {
        let json = serde_json::to_string_pretty(token)?;
        write_file_secure(&self.path, &json).await
    }

    /// Forget the token. Missing files are fine.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to remove {}", self.path.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn lifetime_falls_back_to_one_hour() {
        let token = StoredToken::new("t", None, 1_000);
        assert_eq!(token.expires_at, 1_000 + 3_600_000);
        let token = StoredToken::new("t", Some(0), 0);
        assert_eq!(token.expires_at, 3_600_000);
        let token = StoredToken::new("t", Some(120), 0);
        assert_eq!(token.expires_at, 120_000);
        assert!(token.is_expired_at(120_000));
        assert!(!token.is_expired_at(119_999));
    }

    #[tokio::test]
    async fn save_then_load() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join("google_token.json"));
        assert_eq!(store.load_valid().unwrap(), None);

        let token = StoredToken::new("ya29.token", Some(3599), Utc::now().timestamp_millis());
        store.save(&token).await.unwrap();
        assert_eq!(store.load_valid().unwrap(), Some(token));
    }

    #[tokio::test]
    async fn expired_token_is_removed() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join("google_token.json"));
        let token = StoredToken::new("old", Some(60), 0);
        store.save(&token).await.unwrap();

        assert_eq!(store.load_valid().unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn malformed_token_is_removed() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join("google_token.json"));
        std::fs::write(store.path(), "{not json").unwrap();
        assert_eq!(store.load_valid().unwrap(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn clear_without_file_is_ok() {
        let tmp = TempDir::new().unwrap();
        let store = TokenStore::new(tmp.path().join("missing.json"));
        assert!(store.clear().is_ok());
    }
}
