//! Push notification content and the window client seam used by
//! notification-click handling.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

use crate::config::NotificationDefaults;
use crate::error::{AgentError, Result};

/// A system notification ready for display by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  /// URL the "view" action navigates to.
  pub target_url: String,
  pub actions: Vec<NotificationAction>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationAction {
  pub action: String,
  pub title: String,
}

fn default_actions() -> Vec<NotificationAction> {
  vec![
    NotificationAction {
      action: "view".to_string(),
      title: "View Products".to_string(),
    },
    NotificationAction {
      action: "close".to_string(),
      title: "Close".to_string(),
    },
  ]
}

/// Parse a push payload into a JSON object, or report why it can't be used.
fn parse_payload(payload: &str) -> Result<serde_json::Map<String, Value>> {
  let value: Value = serde_json::from_str(payload)
    .map_err(|e| AgentError::MalformedPush(e.to_string()))?;

  match value {
    Value::Object(map) => Ok(map),
    other => Err(AgentError::MalformedPush(format!(
      "expected a JSON object, got {}",
      other
    ))),
  }
}

/// Build notification content from an optional push payload.
///
/// Payload fields are merged key-by-key over the defaults without validation;
/// a field of the wrong type falls back to its default. A payload that is not
/// a JSON object falls back entirely to defaults.
pub fn build_notification(
  defaults: &NotificationDefaults,
  payload: Option<&str>,
  fallback_url: &str,
) -> Notification {
  let merged = match payload {
    Some(raw) => match parse_payload(raw) {
      Ok(map) => map,
      Err(e) => {
        warn!(error = %e, "push payload unusable, falling back to defaults");
        serde_json::Map::new()
      }
    },
    None => serde_json::Map::new(),
  };

  let field = |key: &str, default: &str| -> String {
    merged
      .get(key)
      .and_then(Value::as_str)
      .unwrap_or(default)
      .to_string()
  };

  let vibrate = merged
    .get("vibrate")
    .and_then(Value::as_array)
    .map(|a| {
      a.iter()
        .filter_map(|v| v.as_u64().and_then(|n| u32::try_from(n).ok()))
        .collect()
    })
    .unwrap_or_else(|| defaults.vibrate.clone());

  Notification {
    title: field("title", &defaults.title),
    body: field("body", &defaults.body),
    icon: field("icon", &defaults.icon),
    badge: field("badge", &defaults.badge),
    vibrate,
    target_url: field("url", fallback_url),
    actions: default_actions(),
  }
}

/// An open consumer window, as reported by the hosting runtime.
#[derive(Debug, Clone)]
pub struct WindowClient {
  pub id: String,
  pub url: String,
}

/// Window registry seam. The hosting runtime owns the real windows; the agent
/// only asks to enumerate, focus, or open them.
#[async_trait]
pub trait WindowClients: Send + Sync {
  async fn match_all(&self) -> Vec<WindowClient>;
  async fn focus(&self, id: &str) -> Result<()>;
  async fn open_window(&self, url: &str) -> Result<()>;
}

/// Host implementation that only logs. The CLI harness has no real windows,
/// so every click falls through to `open_window`.
pub struct LoggedClients;

#[async_trait]
impl WindowClients for LoggedClients {
  async fn match_all(&self) -> Vec<WindowClient> {
    Vec::new()
  }

  async fn focus(&self, id: &str) -> Result<()> {
    tracing::info!(client = %id, "focus window");
    Ok(())
  }

  async fn open_window(&self, url: &str) -> Result<()> {
    tracing::info!(url = %url, "open window");
    Ok(())
  }
}


#[cfg(test)]
mod tests {
  use super::*;

  fn defaults() -> NotificationDefaults {
    NotificationDefaults {
      title: "Storefront".to_string(),
      body: "New offers available!".to_string(),
      icon: "/icons/logo.png".to_string(),
      badge: "/icons/badge.png".to_string(),
      vibrate: vec![200, 100, 200],
    }
  }

  #[test]
  fn no_payload_uses_defaults() {
    let n = build_notification(&defaults(), None, "/");
    assert_eq!(n.title, "Storefront");
    assert_eq!(n.body, "New offers available!");
    assert_eq!(n.target_url, "/");
    assert_eq!(n.actions.len(), 2);
    assert_eq!(n.actions[0].action, "view");
    assert_eq!(n.actions[1].action, "close");
  }

  #[test]
  fn invalid_json_falls_back_entirely() {
    let n = build_notification(&defaults(), Some("{not json"), "/");
    assert_eq!(n.title, "Storefront");
    assert_eq!(n.body, "New offers available!");
    assert_eq!(n.icon, "/icons/logo.png");
    assert_eq!(n.vibrate, vec![200, 100, 200]);
  }

  #[test]
  fn non_object_payload_falls_back_entirely() {
    let n = build_notification(&defaults(), Some("[1, 2, 3]"), "/");
    assert_eq!(n.title, "Storefront");
  }

  #[test]
  fn fields_merge_key_by_key() {
    let n = build_notification(
      &defaults(),
      Some(r#"{"title": "Flash sale", "url": "/gifts.html"}"#),
      "/",
    );
    assert_eq!(n.title, "Flash sale");
    // Unmentioned fields keep their defaults
    assert_eq!(n.body, "New offers available!");
    assert_eq!(n.target_url, "/gifts.html");
  }

  #[test]
  fn wrong_typed_field_keeps_default() {
    let n = build_notification(&defaults(), Some(r#"{"title": 42}"#), "/");
    assert_eq!(n.title, "Storefront");
  }

  #[test]
  fn vibrate_pattern_is_overridable() {
    let n = build_notification(&defaults(), Some(r#"{"vibrate": [100, 50]}"#), "/");
    assert_eq!(n.vibrate, vec![100, 50]);
  }

  #[test]
  fn out_of_range_vibrate_entries_are_dropped() {
    let n = build_notification(
      &defaults(),
      Some(r#"{"vibrate": [100, 5000000000, 50]}"#),
      "/",
    );
    assert_eq!(n.vibrate, vec![100, 50]);
  }
}
