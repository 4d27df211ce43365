//! File-backed credential token.
//!
//! The browser original keeps the bearer token in an `auth_token` cookie
//! with a 24 h max-age; here it is a small JSON file under the data
//! directory with an absolute expiry. An expired token reads as absent,
//! the way an expired cookie does.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Fixed credential lifetime, independent of the session lifetime.
const TOKEN_TTL_HOURS: i64 = 24;

#[derive(Debug, Serialize, Deserialize)]
struct StoredToken {
  token: String,
  expires_at: DateTime<Utc>,
}

pub struct TokenStore {
  path: PathBuf,
}

impl TokenStore {
  /// Open the token store at the default location.
  pub fn open() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(Self::at(data_dir.join("smsc").join("auth_token.json")))
  }

  /// Open a token store at an explicit path.
  pub fn at(path: PathBuf) -> Self {
    Self { path }
  }

  /// Persist a token with the fixed 24 h lifetime.
  pub fn store(&self, token: &str) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create token directory: {}", e))?;
    }

    let stored = StoredToken {
      token: token.to_string(),
      expires_at: Utc::now() + Duration::hours(TOKEN_TTL_HOURS),
    };
    let data = serde_json::to_vec(&stored).map_err(|e| eyre!("Failed to encode token: {}", e))?;
    std::fs::write(&self.path, data)
      .map_err(|e| eyre!("Failed to write token file {}: {}", self.path.display(), e))
  }

  /// The current token, or `None` when absent or expired. An expired file
  /// is removed on the way out.
  pub fn get(&self) -> Option<String> {
    let data = std::fs::read(&self.path).ok()?;
    let stored: StoredToken = serde_json::from_slice(&data).ok()?;

    if stored.expires_at <= Utc::now() {
      self.clear();
      return None;
    }
    Some(stored.token)
  }

  /// Whether an unexpired token is currently held.
  pub fn is_valid(&self) -> bool {
    self.get().is_some()
  }

  /// Drop the token. Missing files are fine; this is called redundantly
  /// from both the 401 path and explicit logout.
  pub fn clear(&self) {
    let _ = std::fs::remove_file(&self.path);
  }
}
