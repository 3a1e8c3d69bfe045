use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Application configuration, resolved once at startup.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
  #[serde(default)]
  pub api: ApiConfig,
  #[serde(default)]
  pub oauth: OAuthConfig,
  #[serde(default)]
  pub search: SearchConfig,
  #[serde(default)]
  pub session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
  /// Base URL that gateway paths like `/api/youtube` are resolved against
  #[serde(default = "default_base_url")]
  pub base_url: String,
  /// Request timeout, applied by the HTTP gateway
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

impl Default for ApiConfig {
  fn default() -> Self {
    Self {
      base_url: default_base_url(),
      timeout_secs: default_timeout_secs(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct OAuthConfig {
  /// OAuth client id; writes are unavailable until this is set
  pub client_id: Option<String>,
  #[serde(default = "default_redirect_uri")]
  pub redirect_uri: String,
  #[serde(default = "default_auth_url")]
  pub auth_url: String,
  /// Gateway path that exchanges an authorization code for an access token
  #[serde(default = "default_token_path")]
  pub token_path: String,
  #[serde(default = "default_scopes")]
  pub scopes: Vec<String>,
}

impl Default for OAuthConfig {
  fn default() -> Self {
    Self {
      client_id: None,
      redirect_uri: default_redirect_uri(),
      auth_url: default_auth_url(),
      token_path: default_token_path(),
      scopes: default_scopes(),
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
  /// Page size used for blog searches when none is given
  #[serde(default = "default_blog_display")]
  pub blog_display: u32,
  /// Page size used for news searches when none is given
  #[serde(default = "default_news_display")]
  pub news_display: u32,
}

impl Default for SearchConfig {
  fn default() -> Self {
    Self {
      blog_display: default_blog_display(),
      news_display: default_news_display(),
    }
  }
}

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
  /// Token survives process restarts for the rest of the login session
  #[default]
  Sqlite,
  /// Token lives only as long as the process
  Memory,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
  #[serde(default)]
  pub storage: StorageKind,
}

fn default_base_url() -> String {
  "http://localhost:3000".to_string()
}

fn default_timeout_secs() -> u64 {
  30
}

fn default_redirect_uri() -> String {
  "http://localhost:3000/oauth/callback".to_string()
}

fn default_auth_url() -> String {
  "https://accounts.google.com/o/oauth2/v2/auth".to_string()
}

fn default_token_path() -> String {
  "/api/auth/token".to_string()
}

fn default_scopes() -> Vec<String> {
  vec!["https://www.googleapis.com/auth/youtube.force-ssl".to_string()]
}

fn default_blog_display() -> u32 {
  100
}

fn default_news_display() -> u32 {
  15
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./mia.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/mia/config.yaml
  ///
  /// Without any file the defaults are used.
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

    let config = match path {
      Some(p) => Self::load_from_path(&p)?,
      None => {
        tracing::debug!("no config file found, using defaults");
        Self::default()
      }
    };

    Ok(config.with_overrides(|name| std::env::var(name).ok()))
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("mia.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("mia").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;

    Self::parse(&contents)
      .map_err(|e| eyre!("Failed to parse config file {}: {}", path.display(), e))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    // An empty file deserializes to null
    if contents.trim().is_empty() {
      return Ok(Self::default());
    }
    serde_yaml::from_str(contents)
  }

  /// Apply `MIA_*` overrides. `lookup` is `std::env::var` outside of tests.
  ///
  /// Checks MIA_API_BASE_URL, MIA_OAUTH_CLIENT_ID and MIA_OAUTH_REDIRECT_URI.
  pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
    if let Some(url) = lookup("MIA_API_BASE_URL") {
      self.api.base_url = url;
    }
    if let Some(id) = lookup("MIA_OAUTH_CLIENT_ID") {
      self.oauth.client_id = Some(id);
    }
    if let Some(uri) = lookup("MIA_OAUTH_REDIRECT_URI") {
      self.oauth.redirect_uri = uri;
    }
    self
  }

  pub fn client_id(&self) -> Option<&str> {
    self.oauth.client_id()
  }
}

impl OAuthConfig {
  /// The configured OAuth client id, ignoring blank values.
  pub fn client_id(&self) -> Option<&str> {
    self
      .client_id
      .as_deref()
      .map(str::trim)
      .filter(|id| !id.is_empty())
  }
}
