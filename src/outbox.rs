//! Caller-side order submission.
//!
//! The agent never queues orders itself: the checkout flow submits through
//! the outbox, which tries live delivery and, when the network is down,
//! persists the order and asks the host to register a deferred sync.

use std::sync::Arc;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::net::{Network, Request, Response};
use crate::queue::{OrderQueue, QueuedOrder};

/// What happened to a submitted order.
#[derive(Debug)]
pub enum SubmitOutcome {
  /// Delivered live; the endpoint accepted it.
  Delivered(Response),
  /// Network unreachable; the order is queued and the host should register a
  /// deferred sync with this tag.
  Queued { sync_tag: String },
}

pub struct Outbox<Q, N> {
  config: Config,
  queue: Arc<Q>,
  net: Arc<N>,
}

impl<Q, N> Outbox<Q, N>
where
  Q: OrderQueue,
  N: Network,
{
  pub fn new(config: Config, queue: Arc<Q>, net: Arc<N>) -> Self {
    Self { config, queue, net }
  }

  /// Submit an order to the remote endpoint, queueing it on network failure.
  ///
  /// `id` is the dedup key: replay after a crash may deliver the same order
  /// twice, and the endpoint is expected to dedup on it. A rejection from a
  /// reachable endpoint is an error, not a connectivity failure, and is not
  /// queued.
  pub async fn submit(&self, id: &str, payload: serde_json::Value) -> Result<SubmitOutcome> {
    let request = Request::post_json(self.config.order_endpoint.clone(), &payload)?;

    match self.net.send(&request).await {
      Ok(response) if response.is_success() => {
        info!(order = %id, status = response.status, "order delivered");
        Ok(SubmitOutcome::Delivered(response))
      }
      Ok(response) => Err(AgentError::Network(format!(
        "order endpoint rejected {} with status {}",
        id, response.status
      ))),
      Err(e) => {
        warn!(order = %id, error = %e, "network down, queueing order");
        self.queue.insert(&QueuedOrder::new(id, payload))?;
        Ok(SubmitOutcome::Queued {
          sync_tag: self.config.sync.orders.clone(),
        })
      }
    }
  }
}
