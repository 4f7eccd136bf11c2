//! Event model: the triggers the hosting runtime fires at the agent, and the
//! outcomes handlers resolve with.
//!
//! Each event is handled by one async task; awaiting the returned future is
//! the host's keep-alive extension for that unit of work.

use std::str::FromStr;

use crate::net::{Request, Response};
use crate::push::Notification;

/// Host-fired events
#[derive(Debug)]
pub enum Event {
  /// New generation deployed; precache the install manifest.
  Install,
  /// New generation ready; purge the rest and claim open consumers.
  Activate,
  /// An outbound request to intercept.
  Fetch(Request),
  /// Deferred sync trigger (connectivity returned).
  Sync { tag: String },
  /// Recurring background trigger.
  PeriodicSync { tag: String },
  /// Incoming push message with an optional raw payload.
  Push { payload: Option<String> },
  /// User interacted with a displayed notification.
  NotificationClick {
    action: ClickAction,
    target_url: Option<String>,
  },
}

/// Notification actions the agent displays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickAction {
  View,
  Close,
}

impl FromStr for ClickAction {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "view" => Ok(ClickAction::View),
      "close" => Ok(ClickAction::Close),
      other => Err(format!("unknown notification action: {}", other)),
    }
  }
}

/// Result of handling one event.
#[derive(Debug)]
pub enum Outcome {
  Installed(InstallReport),
  Activated(ActivateReport),
  Fetched(FetchOutcome),
  Synced(ReplayReport),
  Refreshed(RefreshReport),
  Notified(Notification),
  Clicked(ClickOutcome),
  /// Sync trigger with a tag the agent doesn't own.
  Ignored,
}

#[derive(Debug)]
pub struct InstallReport {
  pub generation: String,
  pub cached: usize,
  /// Activate immediately instead of waiting for old instances to close.
  pub skip_waiting: bool,
}

#[derive(Debug)]
pub struct ActivateReport {
  /// Generation tags deleted on activation.
  pub purged: Vec<String>,
  /// Take control of already-open consumers without a reload.
  pub claim_clients: bool,
}

/// How a fetch was answered.
#[derive(Debug)]
pub enum FetchOutcome {
  /// Not intercepted; the host performs the request itself.
  Passthrough,
  Respond { response: Response, served: Served },
}

/// Where a served response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Served {
  Network,
  Cache,
  /// Offline substitute: the cached root page.
  FallbackPage,
  /// Offline substitute: the cached placeholder image.
  FallbackImage,
  /// Synthetic 408, nothing cached and no network.
  Synthetic,
}

/// Per-item outcome of an order replay pass. Partial success is expected;
/// retained orders wait for the next sync trigger.
#[derive(Debug, Default)]
pub struct ReplayReport {
  pub delivered: Vec<String>,
  pub retained: Vec<String>,
}

/// Per-item outcome of a periodic content refresh.
#[derive(Debug, Default)]
pub struct RefreshReport {
  pub updated: Vec<String>,
  pub failed: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ClickOutcome {
  /// "close" action: dismiss only.
  Dismissed,
  /// Focused an already-open window showing the root page.
  Focused(String),
  /// Opened a new window at the target URL.
  Opened(String),
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn click_actions_parse() {
    assert_eq!("view".parse::<ClickAction>().unwrap(), ClickAction::View);
    assert_eq!("close".parse::<ClickAction>().unwrap(), ClickAction::Close);
    assert!("dismiss".parse::<ClickAction>().is_err());
  }
}
