mod agent;
mod cache;
mod config;
mod error;
mod event;
mod net;
mod outbox;
mod push;
mod queue;

use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use agent::Agent;
use cache::SqliteCacheStore;
use event::{ClickAction, ClickOutcome, Event, FetchOutcome, Outcome, Served};
use net::{HttpNetwork, Request};
use outbox::{Outbox, SubmitOutcome};
use push::LoggedClients;
use queue::{OrderQueue, SqliteOrderQueue};

#[derive(Parser, Debug)]
#[command(name = "storefront-sw")]
#[command(about = "Offline cache & sync agent for the storefront PWA")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storefront-sw/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

/// Each subcommand fires one host event at the agent. Scheduling (when to
/// sync, how often to refresh) stays with whatever invokes this binary.
#[derive(Subcommand, Debug)]
enum Command {
  /// Precache the install manifest under the configured generation
  Install,
  /// Purge old generations and claim open consumers
  Activate,
  /// Intercept a single GET request
  Fetch {
    url: String,
    /// Accept header to send (e.g. "text/html")
    #[arg(long)]
    accept: Option<String>,
  },
  /// Fire a deferred-sync trigger (replays queued orders)
  Sync {
    /// Sync tag; defaults to the configured orders tag
    #[arg(long)]
    tag: Option<String>,
  },
  /// Fire a periodic-sync trigger (refreshes cached content)
  Refresh {
    /// Sync tag; defaults to the configured content tag
    #[arg(long)]
    tag: Option<String>,
  },
  /// Deliver a push payload and print the resulting notification
  Push {
    /// Raw JSON payload; omitted means default notification content
    payload: Option<String>,
  },
  /// Simulate a notification click
  Click {
    /// "view" or "close"
    action: String,
    /// Target URL carried in the notification data
    #[arg(long)]
    url: Option<String>,
  },
  /// Submit an order, queueing it if the network is down
  SubmitOrder {
    /// Caller's dedup key
    id: String,
    /// Order record as JSON
    payload: String,
  },
  /// List queued orders
  Queue,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .with_writer(std::io::stderr)
    .init();

  let args = Args::parse();
  let config = config::Config::load(args.config.as_deref())?;

  let cache = Arc::new(SqliteCacheStore::open_default()?);
  let queue = Arc::new(SqliteOrderQueue::open_default()?);
  let net = Arc::new(HttpNetwork::new()?);
  let clients = Arc::new(LoggedClients);

  let agent = Agent::new(
    config.clone(),
    Arc::clone(&cache),
    Arc::clone(&queue),
    Arc::clone(&net),
    clients,
  );

  match args.command {
    Command::Install => report(agent.handle(Event::Install).await?),
    Command::Activate => report(agent.handle(Event::Activate).await?),
    Command::Fetch { url, accept } => {
      let mut request = Request::get(url);
      if let Some(accept) = accept {
        request = request.with_accept(accept);
      }
      report(agent.handle(Event::Fetch(request)).await?);
    }
    Command::Sync { tag } => {
      let tag = tag.unwrap_or_else(|| config.sync.orders.clone());
      report(agent.handle(Event::Sync { tag }).await?);
    }
    Command::Refresh { tag } => {
      let tag = tag.unwrap_or_else(|| config.sync.content.clone());
      report(agent.handle(Event::PeriodicSync { tag }).await?);
    }
    Command::Push { payload } => report(agent.handle(Event::Push { payload }).await?),
    Command::Click { action, url } => {
      let action = action.parse::<ClickAction>().map_err(|e| eyre!(e))?;
      report(
        agent
          .handle(Event::NotificationClick {
            action,
            target_url: url,
          })
          .await?,
      );
    }
    Command::SubmitOrder { id, payload } => {
      let payload: serde_json::Value =
        serde_json::from_str(&payload).map_err(|e| eyre!("invalid order payload: {}", e))?;

      let outbox = Outbox::new(config, queue, net);
      match outbox.submit(&id, payload).await? {
        SubmitOutcome::Delivered(response) => {
          println!("delivered ({})", response.status);
        }
        SubmitOutcome::Queued { sync_tag } => {
          println!("queued; register a deferred sync with tag '{}'", sync_tag);
        }
      }
    }
    Command::Queue => {
      let orders = queue.list_all()?;
      if orders.is_empty() {
        println!("queue is empty");
      }
      for order in orders {
        println!(
          "{}  {}  {}",
          order.id,
          order.timestamp.to_rfc3339(),
          order.payload
        );
      }
    }
  }

  Ok(())
}

fn report(outcome: Outcome) {
  match outcome {
    Outcome::Installed(r) => {
      println!(
        "installed generation {} ({} resources cached, skip_waiting={})",
        r.generation, r.cached, r.skip_waiting
      );
    }
    Outcome::Activated(r) => {
      if r.purged.is_empty() {
        println!("activated; no old generations to purge");
      } else {
        println!("activated; purged: {}", r.purged.join(", "));
      }
    }
    Outcome::Fetched(FetchOutcome::Passthrough) => println!("passthrough"),
    Outcome::Fetched(FetchOutcome::Respond { response, served }) => {
      let source = match served {
        Served::Network => "network",
        Served::Cache => "cache",
        Served::FallbackPage => "offline page",
        Served::FallbackImage => "placeholder image",
        Served::Synthetic => "synthetic",
      };
      println!(
        "{} {} bytes from {}",
        response.status,
        response.body.len(),
        source
      );
    }
    Outcome::Synced(r) => {
      println!(
        "sync: {} delivered, {} retained",
        r.delivered.len(),
        r.retained.len()
      );
    }
    Outcome::Refreshed(r) => {
      println!(
        "refresh: {} updated, {} failed",
        r.updated.len(),
        r.failed.len()
      );
    }
    Outcome::Notified(n) => {
      println!("notification: {}: {} (view -> {})", n.title, n.body, n.target_url);
    }
    Outcome::Clicked(ClickOutcome::Dismissed) => println!("dismissed"),
    Outcome::Clicked(ClickOutcome::Focused(url)) => println!("focused window at {}", url),
    Outcome::Clicked(ClickOutcome::Opened(url)) => println!("opened window at {}", url),
    Outcome::Ignored => println!("ignored (unknown tag)"),
  }
}
