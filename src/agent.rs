//! The Offline Cache & Sync Agent.
//!
//! One async handler per host event, entered through [`Agent::handle`].
//! Stores and network are injected; the agent owns policy only: what to
//! precache, which requests to intercept, when to fall back, and how queued
//! orders get replayed.

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::cache::{CacheStore, CachedResource};
use crate::config::Config;
use crate::error::{AgentError, Result};
use crate::event::{
  ActivateReport, ClickAction, ClickOutcome, Event, FetchOutcome, InstallReport, Outcome,
  RefreshReport, ReplayReport, Served,
};
use crate::net::{self, Network, Request, Response};
use crate::push::{self, Notification, WindowClients};
use crate::queue::{OrderQueue, QueuedOrder};

pub struct Agent<C, Q, N, W> {
  config: Config,
  cache: Arc<C>,
  queue: Arc<Q>,
  net: Arc<N>,
  clients: Arc<W>,
}

impl<C, Q, N, W> Clone for Agent<C, Q, N, W> {
  fn clone(&self) -> Self {
    Self {
      config: self.config.clone(),
      cache: Arc::clone(&self.cache),
      queue: Arc::clone(&self.queue),
      net: Arc::clone(&self.net),
      clients: Arc::clone(&self.clients),
    }
  }
}

impl<C, Q, N, W> Agent<C, Q, N, W>
where
  C: CacheStore,
  Q: OrderQueue,
  N: Network,
  W: WindowClients,
{
  /// Stores are shared with the host, so they arrive pre-wrapped.
  pub fn new(config: Config, cache: Arc<C>, queue: Arc<Q>, net: Arc<N>, clients: Arc<W>) -> Self {
    Self {
      config,
      cache,
      queue,
      net,
      clients,
    }
  }

  /// Dispatch one host event. Only install and activate surface errors; every
  /// other handler contains its failures and resolves with an outcome.
  pub async fn handle(&self, event: Event) -> Result<Outcome> {
    match event {
      Event::Install => Ok(Outcome::Installed(self.install().await?)),
      Event::Activate => Ok(Outcome::Activated(self.activate()?)),
      Event::Fetch(request) => Ok(Outcome::Fetched(self.fetch(request).await)),
      Event::Sync { tag } => {
        if tag == self.config.sync.orders {
          Ok(Outcome::Synced(self.replay_orders().await))
        } else {
          debug!(tag = %tag, "ignoring sync trigger");
          Ok(Outcome::Ignored)
        }
      }
      Event::PeriodicSync { tag } => {
        if tag == self.config.sync.content {
          Ok(Outcome::Refreshed(self.refresh_content().await))
        } else {
          debug!(tag = %tag, "ignoring periodic trigger");
          Ok(Outcome::Ignored)
        }
      }
      Event::Push { payload } => Ok(Outcome::Notified(self.push(payload.as_deref()))),
      Event::NotificationClick { action, target_url } => Ok(Outcome::Clicked(
        self.notification_click(action, target_url).await,
      )),
    }
  }

  /// Precache the install manifest under the configured generation.
  /// All-or-nothing: responses are staged in memory and nothing is written
  /// until every fetch has succeeded, so a failed install leaves the prior
  /// generation untouched.
  async fn install(&self) -> Result<InstallReport> {
    let urls = self.config.manifest_urls()?;
    info!(generation = %self.config.generation, resources = urls.len(), "installing");

    let fetches = urls.iter().map(|url| {
      let net = Arc::clone(&self.net);
      async move {
        let response = net.send(&Request::get(url.clone())).await?;
        if !response.is_success() {
          return Err(AgentError::Network(format!(
            "{} returned {}",
            url, response.status
          )));
        }
        Ok::<_, AgentError>((url.clone(), response))
      }
    });

    let staged = try_join_all(fetches).await?;

    for (url, response) in &staged {
      self
        .cache
        .put(&self.config.generation, url, &CachedResource::from(response))?;
    }

    info!(generation = %self.config.generation, cached = staged.len(), "install complete");

    Ok(InstallReport {
      generation: self.config.generation.clone(),
      cached: staged.len(),
      skip_waiting: true,
    })
  }

  /// Purge every generation except the current one and claim open consumers.
  fn activate(&self) -> Result<ActivateReport> {
    let purged = self.cache.purge_except(&self.config.generation)?;
    for generation in &purged {
      info!(%generation, "deleted old cache generation");
    }

    info!(generation = %self.config.generation, "activated, claiming clients");

    Ok(ActivateReport {
      purged,
      claim_clients: true,
    })
  }

  /// Request interception. Non-GET requests and non-http schemes pass
  /// through; the order endpoint is network-first; everything else is
  /// cache-first with offline fallbacks.
  async fn fetch(&self, request: Request) -> FetchOutcome {
    if !request.method.is_get() || !net::is_http(&request.url) {
      return FetchOutcome::Passthrough;
    }

    if request.url.contains(&self.config.order_endpoint) {
      return self.network_first(request).await;
    }

    self.cache_first(request).await
  }

  async fn network_first(&self, request: Request) -> FetchOutcome {
    match self.net.send(&request).await {
      Ok(response) => {
        // Keep a copy for offline reference
        self.store_copy(&request.url, &response);
        FetchOutcome::Respond {
          response,
          served: Served::Network,
        }
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "order endpoint unreachable, trying cache");
        match self.lookup(&request.url) {
          Ok(resource) => FetchOutcome::Respond {
            response: resource.into_response(request.url.clone()),
            served: Served::Cache,
          },
          Err(_) => FetchOutcome::Respond {
            response: Response::request_timeout(request.url.clone()),
            served: Served::Synthetic,
          },
        }
      }
    }
  }

  async fn cache_first(&self, request: Request) -> FetchOutcome {
    if let Ok(resource) = self.lookup(&request.url) {
      debug!(url = %request.url, "serving from cache");
      return FetchOutcome::Respond {
        response: resource.into_response(request.url.clone()),
        served: Served::Cache,
      };
    }

    match self.net.send(&request).await {
      Ok(response) => {
        // Only complete, same-origin responses are kept for later
        if response.status == 200 && net::same_origin(&response.url, &self.config.base_url) {
          self.store_copy(&request.url, &response);
        }
        FetchOutcome::Respond {
          response,
          served: Served::Network,
        }
      }
      Err(e) => {
        warn!(url = %request.url, error = %e, "fetch failed, falling back");
        self.offline_fallback(&request)
      }
    }
  }

  /// No cache, no network. HTML requests get the cached root page, images get
  /// the cached placeholder, everything else gets a synthetic 408.
  fn offline_fallback(&self, request: &Request) -> FetchOutcome {
    if request.accepts_html() {
      if let Some(outcome) = self.substitute(&self.config.offline_page, Served::FallbackPage) {
        return outcome;
      }
    } else if net::is_image_url(&request.url) {
      if let Some(outcome) = self.substitute(&self.config.placeholder_image, Served::FallbackImage)
      {
        return outcome;
      }
    }

    FetchOutcome::Respond {
      response: Response::request_timeout(request.url.clone()),
      served: Served::Synthetic,
    }
  }

  fn substitute(&self, configured: &str, served: Served) -> Option<FetchOutcome> {
    let url = self.config.resolve(configured).ok()?;
    let resource = self.lookup(&url).ok()?;
    Some(FetchOutcome::Respond {
      response: resource.into_response(url),
      served,
    })
  }

  /// Replay queued orders to the order endpoint. Best-effort: each order is
  /// attempted, delivered ones are deleted, failures stay queued for the next
  /// sync trigger. Re-delivery is safe because the endpoint dedups on id.
  async fn replay_orders(&self) -> ReplayReport {
    let mut report = ReplayReport::default();

    let orders = match self.queue.list_all() {
      Ok(orders) => orders,
      Err(e) => {
        error!(error = %e, "failed to read order queue");
        return report;
      }
    };

    if orders.is_empty() {
      return report;
    }

    info!(pending = orders.len(), "replaying queued orders");

    for order in orders {
      match self.deliver(&order).await {
        Ok(()) => match self.queue.delete_by_id(&order.id) {
          Ok(()) => {
            info!(order = %order.id, "order synced");
            report.delivered.push(order.id);
          }
          Err(e) => {
            error!(order = %order.id, error = %e, "delivered but failed to dequeue");
            report.retained.push(order.id);
          }
        },
        Err(e) => {
          warn!(order = %order.id, error = %e, "delivery failed, keeping queued");
          report.retained.push(order.id);
        }
      }
    }

    report
  }

  async fn deliver(&self, order: &QueuedOrder) -> Result<()> {
    let request = Request::post_json(self.config.order_endpoint.clone(), &order.payload)?;
    let response = self.net.send(&request).await?;

    if response.is_success() {
      Ok(())
    } else {
      Err(AgentError::Network(format!(
        "order endpoint returned {}",
        response.status
      )))
    }
  }

  /// Re-fetch every manifest URL and overwrite the current generation's copy.
  /// Individual failures are logged and never block the rest of the batch.
  async fn refresh_content(&self) -> RefreshReport {
    let mut report = RefreshReport::default();

    let urls = match self.config.manifest_urls() {
      Ok(urls) => urls,
      Err(e) => {
        error!(error = %e, "invalid install manifest");
        return report;
      }
    };

    for url in urls {
      match self.net.send(&Request::get(url.clone())).await {
        Ok(response) if response.is_success() => {
          match self
            .cache
            .put(&self.config.generation, &url, &CachedResource::from(&response))
          {
            Ok(()) => {
              debug!(url = %url, "content updated");
              report.updated.push(url);
            }
            Err(e) => {
              warn!(url = %url, error = %e, "failed to store refreshed copy");
              report.failed.push(url);
            }
          }
        }
        Ok(response) => {
          warn!(url = %url, status = response.status, "refresh fetch rejected");
          report.failed.push(url);
        }
        Err(e) => {
          warn!(url = %url, error = %e, "refresh fetch failed");
          report.failed.push(url);
        }
      }
    }

    info!(
      updated = report.updated.len(),
      failed = report.failed.len(),
      "content refresh finished"
    );

    report
  }

  fn push(&self, payload: Option<&str>) -> Notification {
    push::build_notification(&self.config.notifications, payload, &self.config.offline_page)
  }

  /// "close" dismisses; anything else focuses an open root window if there is
  /// one, otherwise opens a new window at the notification's target URL.
  async fn notification_click(
    &self,
    action: ClickAction,
    target_url: Option<String>,
  ) -> ClickOutcome {
    if action == ClickAction::Close {
      return ClickOutcome::Dismissed;
    }

    let root = self
      .config
      .resolve(&self.config.offline_page)
      .unwrap_or_else(|_| self.config.offline_page.clone());

    let windows = self.clients.match_all().await;
    if let Some(window) = windows
      .iter()
      .find(|w| w.url == root || w.url == self.config.offline_page)
    {
      if let Err(e) = self.clients.focus(&window.id).await {
        warn!(client = %window.id, error = %e, "failed to focus window");
      }
      return ClickOutcome::Focused(window.url.clone());
    }

    let target = target_url.unwrap_or(root);
    if let Err(e) = self.clients.open_window(&target).await {
      warn!(url = %target, error = %e, "failed to open window");
    }
    ClickOutcome::Opened(target)
  }

  /// Cache lookup in the current generation; read errors degrade to a miss.
  fn lookup(&self, url: &str) -> Result<CachedResource> {
    match self.cache.get(&self.config.generation, url) {
      Ok(Some(resource)) => Ok(resource),
      Ok(None) => Err(AgentError::CacheMiss(url.to_string())),
      Err(e) => {
        warn!(url = %url, error = %e, "cache read failed, treating as miss");
        Err(AgentError::CacheMiss(url.to_string()))
      }
    }
  }

  /// Cache write that never fails the request being served.
  fn store_copy(&self, url: &str, response: &Response) {
    if let Err(e) = self
      .cache
      .put(&self.config.generation, url, &CachedResource::from(response))
    {
      warn!(url = %url, error = %e, "failed to cache response");
    }
  }
}
