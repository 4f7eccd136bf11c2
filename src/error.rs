//! Error taxonomy for the offline agent.

use thiserror::Error;

/// Failures the agent can encounter. None of these are fatal to the host:
/// fetch handling falls back to cache or synthetic responses, replay and
/// refresh continue past per-item failures, and malformed push payloads
/// degrade to default notification content.
#[derive(Debug, Error)]
pub enum AgentError {
  /// Network fetch rejected, timed out, or returned an unusable response.
  #[error("network failure: {0}")]
  Network(String),

  /// No cached entry for the requested key.
  #[error("cache miss: {0}")]
  CacheMiss(String),

  /// Durable store (resource cache or order queue) read/write error.
  #[error("storage failure: {0}")]
  Storage(String),

  /// Push payload was not valid JSON or not a JSON object.
  #[error("malformed push payload: {0}")]
  MalformedPush(String),
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;
