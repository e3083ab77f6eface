use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Custom field holding the epic name on classic Jira installs.
pub const DEFAULT_EPIC_NAME_FIELD: &str = "customfield_11401";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
  pub jira: JiraConfig,
  /// Token issued by the last successful login
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub token: Option<String>,
  #[serde(default)]
  pub cache: CacheConfig,
  /// File this configuration was loaded from; `save` writes back to it.
  #[serde(skip)]
  path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JiraConfig {
  pub url: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub username: Option<String>,
  /// Custom field set to the summary when creating epics
  #[serde(default = "default_epic_name_field")]
  pub epic_name_field: String,
}

fn default_epic_name_field() -> String {
  DEFAULT_EPIC_NAME_FIELD.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
  #[serde(default = "default_true")]
  pub enabled: bool,
  /// Minutes before cached reference data is refetched
  #[serde(default = "default_stale_minutes")]
  pub stale_minutes: i64,
  /// Cache database location (defaults to the user data directory)
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<PathBuf>,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      enabled: true,
      stale_minutes: default_stale_minutes(),
      path: None,
    }
  }
}

fn default_true() -> bool {
  true
}

fn default_stale_minutes() -> i64 {
  24 * 60
}

impl Config {
  /// Build an in-memory configuration for `url`. Nothing is written by `save`.
  pub fn new(url: impl Into<String>) -> Self {
    Self {
      jira: JiraConfig {
        url: url.into(),
        username: None,
        epic_name_field: default_epic_name_field(),
      },
      token: None,
      cache: CacheConfig::default(),
      path: None,
    }
  }

  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./jira-soap.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/jira-soap/config.yaml
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
      None => Err(eyre!(
        "No configuration file found. Create one at ~/.config/jira-soap/config.yaml \
         containing at least:\n\njira:\n  url: https://jira.example.com"
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("jira-soap.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("jira-soap").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  pub fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    let mut config: Config = serde_yaml::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))?;
    config.path = Some(path.to_path_buf());

    Ok(config)
  }

  /// Attach a backing file, so later `save` calls write to it.
  pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
    self.path = Some(path.into());
    self
  }

  pub fn path(&self) -> Option<&Path> {
    self.path.as_deref()
  }

  /// Write the configuration back to the file it came from.
  pub fn save(&self) -> Result<()> {
    let Some(path) = &self.path else {
      tracing::debug!("configuration has no backing file, not saving");
      return Ok(());
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create config directory {}: {}", parent.display(), e))?;
    }

    let contents =
      serde_yaml::to_string(self).map_err(|e| eyre!("Failed to serialize config: {}", e))?;
    std::fs::write(path, contents)
      .map_err(|e| eyre!("Failed to write config file {}: {}", path.display(), e))?;

    Ok(())
  }

  /// Get the Jira password from environment variables.
  ///
  /// Checks JIRA_SOAP_PASSWORD.
  pub fn get_password() -> Result<String> {
    std::env::var("JIRA_SOAP_PASSWORD")
      .map_err(|_| eyre!("Jira password not found. Set JIRA_SOAP_PASSWORD or pass --password."))
  }
}
