use color_eyre::{eyre::eyre, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::AgentError;

/// Deployment configuration for the offline agent.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  /// Cache generation tag. Bumping this ships a new snapshot; activation
  /// purges every other generation.
  pub generation: String,
  /// Origin the storefront is served from. Relative manifest entries resolve
  /// against this, and runtime cache writes require same-origin responses.
  pub base_url: String,
  /// Resources fetched and cached at install time (pages, icons,
  /// stylesheets). May include cross-origin CDN URLs.
  pub precache: Vec<String>,
  /// Order submission endpoint. Requests whose URL contains this string are
  /// handled network-first.
  pub order_endpoint: String,
  /// Page substituted when an HTML request has no cache and no network.
  #[serde(default = "default_offline_page")]
  pub offline_page: String,
  /// Image substituted when an image request has no cache and no network.
  pub placeholder_image: String,
  #[serde(default)]
  pub sync: SyncTags,
  #[serde(default)]
  pub notifications: NotificationDefaults,
}

/// Tags the hosting runtime uses when firing sync triggers.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncTags {
  #[serde(default = "default_orders_tag")]
  pub orders: String,
  #[serde(default = "default_content_tag")]
  pub content: String,
}

impl Default for SyncTags {
  fn default() -> Self {
    Self {
      orders: default_orders_tag(),
      content: default_content_tag(),
    }
  }
}

/// Default notification content; push payload fields are merged over these.
#[derive(Debug, Clone, Deserialize)]
pub struct NotificationDefaults {
  #[serde(default = "default_notification_title")]
  pub title: String,
  #[serde(default = "default_notification_body")]
  pub body: String,
  #[serde(default)]
  pub icon: String,
  #[serde(default)]
  pub badge: String,
  #[serde(default = "default_vibrate")]
  pub vibrate: Vec<u32>,
}

impl Default for NotificationDefaults {
  fn default() -> Self {
    Self {
      title: default_notification_title(),
      body: default_notification_body(),
      icon: String::new(),
      badge: String::new(),
      vibrate: default_vibrate(),
    }
  }
}

fn default_offline_page() -> String {
  "/".to_string()
}

fn default_orders_tag() -> String {
  "sync-orders".to_string()
}

fn default_content_tag() -> String {
  "update-content".to_string()
}

fn default_notification_title() -> String {
  "Storefront".to_string()
}

fn default_notification_body() -> String {
  "New offers available!".to_string()
}

fn default_vibrate() -> Vec<u32> {
  vec![200, 100, 200]
}

impl Config {
  /// Load configuration from file.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./storefront-sw.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/storefront-sw/config.yaml
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
        "No configuration file found. Create one at ~/.config/storefront-sw/config.yaml\n\
                 See config.example.yaml for the format."
      )),
    }
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("storefront-sw.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("storefront-sw").join("config.yaml");
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

  /// Resolve a possibly-relative URL against the configured base.
  pub fn resolve(&self, url: &str) -> Result<String, AgentError> {
    let base = Url::parse(&self.base_url)
      .map_err(|e| AgentError::Network(format!("invalid base_url {}: {}", self.base_url, e)))?;

    base
      .join(url)
      .map(|u| u.to_string())
      .map_err(|e| AgentError::Network(format!("invalid url {}: {}", url, e)))
  }

  /// The install manifest as absolute URLs.
  pub fn manifest_urls(&self) -> Result<Vec<String>, AgentError> {
    self.precache.iter().map(|u| self.resolve(u)).collect()
  }
}

#[cfg(test)]
pub mod testing {
  use super::*;

  /// Fixed configuration used across the module tests.
  pub fn test_config() -> Config {
    Config {
      generation: "storefront-v1.0".to_string(),
      base_url: "https://shop.example".to_string(),
      precache: vec![
        "/".to_string(),
        "/mens.html".to_string(),
        "https://cdn.example/icons/logo.png".to_string(),
      ],
      order_endpoint: "https://orders.example/submit".to_string(),
      offline_page: "/".to_string(),
      placeholder_image: "https://cdn.example/icons/placeholder.webp".to_string(),
      sync: SyncTags::default(),
      notifications: NotificationDefaults::default(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::testing::test_config;
  use super::*;

  #[test]
  fn parses_minimal_yaml_with_defaults() {
    let yaml = r#"
generation: storefront-v2.0
base_url: https://shop.example
precache:
  - /
  - /index.html
order_endpoint: https://orders.example/submit
placeholder_image: /icons/placeholder.webp
"#;

    let config: Config = serde_yaml::from_str(yaml).unwrap();
    assert_eq!(config.generation, "storefront-v2.0");
    assert_eq!(config.offline_page, "/");
    assert_eq!(config.sync.orders, "sync-orders");
    assert_eq!(config.sync.content, "update-content");
    assert_eq!(config.notifications.vibrate, vec![200, 100, 200]);
  }

  #[test]
  fn manifest_resolves_relative_entries() {
    let config = test_config();
    let urls = config.manifest_urls().unwrap();

    assert_eq!(urls[0], "https://shop.example/");
    assert_eq!(urls[1], "https://shop.example/mens.html");
    // Absolute entries are kept as-is
    assert_eq!(urls[2], "https://cdn.example/icons/logo.png");
  }

  #[test]
  fn resolve_rejects_invalid_base() {
    let mut config = test_config();
    config.base_url = "not a url".to_string();
    assert!(config.resolve("/").is_err());
  }
}
