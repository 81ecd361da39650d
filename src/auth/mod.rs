//! Access token persistence and the login gate.
//!
//! The backend exchanges a short-lived access code for a signed token. The
//! token is the only state kept between runs; every command talking to the
//! backend requires one that has not expired.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::client::{AuthError, BackendClient};
use crate::global;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    pub saved_at: DateTime<Utc>,
}

impl StoredToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            saved_at: Utc::now(),
        }
    }

    /// Expiry read from the JWT `exp` claim, if the token carries one.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        jwt_expiry(&self.token)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at().is_some_and(|exp| now >= exp)
    }
}

/// File-backed store for the single access token.
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn default_location() -> Result<Self> {
        Ok(Self::new(global::token_file()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Option<StoredToken>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path).context("Failed to read token file")?;
        match serde_json::from_str(&content) {
            Ok(token) => Ok(Some(token)),
            Err(e) => {
                warn!("Ignoring unreadable token file {:?}: {}", self.path, e);
                Ok(None)
            }
        }
    }

    pub fn save(&self, token: &StoredToken) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create config directory")?;
        }
        let content = serde_json::to_string_pretty(token).context("Failed to serialize token")?;
        std::fs::write(&self.path, content).context("Failed to write token file")?;
        restrict_permissions(&self.path);
        Ok(())
    }

    /// Remove the stored token. Returns whether one existed.
    pub fn clear(&self) -> Result<bool> {
        if !self.path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&self.path).context("Failed to remove token file")?;
        Ok(true)
    }

    /// The gate in front of every backend command.
    ///
    /// An expired token is deleted so the next run starts from `login`.
    pub fn require_valid(&self) -> Result<StoredToken, AuthError> {
        let token = self
            .load()
            .map_err(|e| {
                warn!("Could not load token: {:#}", e);
                AuthError::NotLoggedIn
            })?
            .ok_or(AuthError::NotLoggedIn)?;

        if token.is_expired_at(Utc::now()) {
            info!("Stored access token expired, removing it");
            if let Err(e) = self.clear() {
                warn!("Failed to remove expired token: {:#}", e);
            }
            return Err(AuthError::Expired);
        }

        Ok(token)
    }
}

/// Normalise what the user typed: codes are upper-case without padding.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

/// Exchange an access code for a token and persist it.
pub async fn login(client: &BackendClient, store: &TokenStore, code: &str) -> Result<StoredToken> {
    let code = normalize_code(code);
    if code.is_empty() {
        anyhow::bail!("Access code must not be empty");
    }

    let token = client.validate_access_code(&code).await?;
    let stored = StoredToken::new(token);
    store.save(&stored)?;

    match stored.expires_at() {
        Some(exp) => info!("Logged in, access valid until {}", exp),
        None => info!("Logged in"),
    }
    Ok(stored)
}

fn jwt_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let exp = claims.get("exp")?;

    if let Some(secs) = exp.as_i64() {
        return DateTime::from_timestamp(secs, 0);
    }
    if let Some(secs) = exp.as_f64() {
        return DateTime::from_timestamp(secs as i64, 0);
    }

    let raw = exp.as_str()?;
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    // Naive timestamps are UTC, as the backend treats them.
    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .ok();
    debug!("Token exp claim '{}' parsed as {:?}", raw, naive);
    naive.map(|n| n.and_utc())
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Err(e) = std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)) {
        warn!("Failed to restrict token file permissions: {}", e);
    }
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) {}
