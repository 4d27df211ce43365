//! Persisted session blob.
//!
//! A single JSON file mirroring the in-memory session (`{layout, auth,
//! _persist}`). It is a rehydration aid only: the canonical values live in
//! memory and the blob is rewritten from them, never merged.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::store::User;

/// Delay before the blob is removed on logout, so an in-flight write from
/// the same teardown does not resurrect it.
const CLEAR_DELAY: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedRoot {
  /// Serialized layout document, when one is known.
  #[serde(default)]
  pub layout: Option<String>,
  pub auth: PersistedAuth,
  #[serde(rename = "_persist")]
  pub meta: PersistMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedAuth {
  pub is_logged_in: bool,
  #[serde(default)]
  pub user: Option<User>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistMeta {
  pub version: i32,
  pub rehydrated: bool,
}

impl Default for PersistMeta {
  fn default() -> Self {
    Self {
      version: -1,
      rehydrated: true,
    }
  }
}

pub struct PersistStore {
  path: PathBuf,
}

impl PersistStore {
  /// Open the blob store at the default location.
  pub fn open() -> Result<Self> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(Self::at(data_dir.join("smsc").join("persist_root.json")))
  }

  /// Open a blob store at an explicit path.
  pub fn at(path: PathBuf) -> Self {
    Self { path }
  }

  pub fn save(&self, root: &PersistedRoot) -> Result<()> {
    if let Some(parent) = self.path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create state directory: {}", e))?;
    }
    let data = serde_json::to_vec(root).map_err(|e| eyre!("Failed to encode state: {}", e))?;
    std::fs::write(&self.path, data)
      .map_err(|e| eyre!("Failed to write {}: {}", self.path.display(), e))
  }

  /// The persisted blob, or `None` when absent or unreadable. A corrupt
  /// blob is the same as no blob; it gets rewritten on the next save.
  pub fn load(&self) -> Option<PersistedRoot> {
    let data = std::fs::read(&self.path).ok()?;
    serde_json::from_slice(&data).ok()
  }

  /// Remove the blob after a short delay. Must be called from within a
  /// tokio runtime.
  pub fn clear_deferred(&self) -> JoinHandle<()> {
    let path = self.path.clone();
    tokio::spawn(async move {
      tokio::time::sleep(CLEAR_DELAY).await;
      let _ = std::fs::remove_file(&path);
    })
  }
}
