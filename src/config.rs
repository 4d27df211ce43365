use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub layout: LayoutConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL of the records API
  #[serde(default = "default_api_url")]
  pub url: String,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      url: default_api_url(),
    }
  }
}

fn default_api_url() -> String {
  "http://localhost:8080".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct CacheConfig {
  /// Minutes before a cached collection is considered stale
  #[serde(default = "default_stale_minutes")]
  pub stale_minutes: u64,
}

impl CacheConfig {
  pub fn stale_time(&self) -> Duration {
    Duration::from_secs(self.stale_minutes * 60)
  }
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      stale_minutes: default_stale_minutes(),
    }
  }
}

fn default_stale_minutes() -> u64 {
  5
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LayoutConfig {
  /// Debounce window for layout persistence, in milliseconds
  #[serde(default = "default_debounce_ms")]
  pub debounce_ms: u64,
}

impl LayoutConfig {
  pub fn debounce(&self) -> Duration {
    Duration::from_millis(self.debounce_ms)
  }
}

impl Default for LayoutConfig {
  fn default() -> Self {
    Self {
      debounce_ms: default_debounce_ms(),
    }
  }
}

fn default_debounce_ms() -> u64 {
  500
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./smsc.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/smsc/config.yaml
  ///
  /// With no file anywhere, defaults apply (API at localhost:8080).
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(eyre!("Config file not found: {}", p.display()));
      }
    } else {
      Self::find_config_file()
    };

    match path {
      Some(p) => Self::load_from_path(&p),
      None => Ok(Config::default()),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("smsc.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("smsc").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;

    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_without_a_file() {
    let config = Config::default();
    assert_eq!(config.api.url, "http://localhost:8080");
    assert_eq!(config.cache.stale_time(), Duration::from_secs(300));
    assert_eq!(config.layout.debounce(), Duration::from_millis(500));
  }

  #[test]
  fn partial_file_keeps_remaining_defaults() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("smsc.yaml");
    std::fs::write(&path, "api:\n  url: https://records.example/api\n").unwrap();

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.api.url, "https://records.example/api");
    assert_eq!(config.cache.stale_minutes, 5);
  }

  #[test]
  fn explicit_missing_path_is_an_error() {
    assert!(Config::load(Some(Path::new("/definitely/not/here.yaml"))).is_err());
  }

  #[test]
  fn malformed_yaml_is_an_error() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("smsc.yaml");
    std::fs::write(&path, "api: [unclosed").unwrap();
    assert!(Config::load(Some(&path)).is_err());
  }
}
