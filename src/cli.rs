//! Subcommands: each one drives a single worker event against the local stores.

use clap::Subcommand;
use color_eyre::Result;
use std::sync::Arc;

use crate::cache::{CacheSource, Served, SqliteStorage};
use crate::config::Config;
use crate::error::ErrorKind;
use crate::fetch::{Fetcher, HttpFetcher};
use crate::http::{Destination, Request, Response};
use crate::worker::{
  ClickOutcome, ClientHandle, Clients, ControlMessage, EventOutcome, InstallOutcome, Worker,
  WorkerEvent,
};

#[derive(Subcommand, Debug)]
pub enum Command {
  /// Warm the static store for the configured version, then activate
  Install,
  /// Purge stores left behind by other versions
  Activate,
  /// Route one request through the worker
  Fetch {
    /// Path on the origin, or an absolute URL
    target: String,
    #[arg(short, long, default_value = "GET")]
    method: String,
    #[arg(short, long, value_enum, default_value_t = Destination::Other)]
    destination: Destination,
    /// Extra request header as NAME:VALUE (repeatable)
    #[arg(short = 'H', long = "header", value_parser = parse_header)]
    headers: Vec<(String, String)>,
    /// Print the response body
    #[arg(long)]
    body: bool,
  },
  /// List stores and their contents
  Stores,
  /// Deliver a raw control message, e.g. '{"type":"skip-waiting"}'
  Message { json: String },
  /// Delete every store, whatever its version
  Clear,
  /// Simulate a push event
  Push {
    payload: Option<String>,
    /// Also simulate clicking the notification
    #[arg(long)]
    click: bool,
  },
  /// Fire a background sync event, e.g. `sync sync-data`
  Sync { tag: String },
}

fn parse_header(raw: &str) -> std::result::Result<(String, String), String> {
  match raw.split_once(':') {
    Some((name, value)) if !name.trim().is_empty() => {
      Ok((name.trim().to_string(), value.trim().to_string()))
    }
    _ => Err(format!("expected NAME:VALUE, got '{}'", raw)),
  }
}

pub async fn run(command: Command, config: &Config) -> Result<()> {
  let storage = Arc::new(SqliteStorage::open_at(&config.database_path()?)?);
  let fetcher = Arc::new(HttpFetcher::new(&config.network)?);
  let worker = Worker::new(config, storage, fetcher.clone())?;

  // This terminal is the one client context
  let mut terminal = worker.clients().add(&config.root_document);

  match command {
    Command::Install => {
      let outcome = worker.handle(WorkerEvent::Install).await?;
      print_outcome(outcome, worker.clients());
    }
    Command::Activate => {
      let outcome = worker.handle(WorkerEvent::Activate).await?;
      print_outcome(outcome, worker.clients());
    }
    Command::Fetch {
      target,
      method,
      destination,
      headers,
      body,
    } => {
      worker.lifecycle().restore().await?;
      let url = config.url_for(&target)?;
      let request = headers.iter().fold(
        Request::parse(&method, url.as_str())?.with_destination(destination),
        |request, (name, value)| request.with_header(name, value),
      );

      match worker.handle(WorkerEvent::Fetch(request.clone())).await {
        Ok(EventOutcome::Respond(served)) => print_served(&served, body),
        Ok(EventOutcome::PassThrough) => {
          let response = fetcher.fetch(&request).await?;
          print_response(&response, "network (not intercepted)", body);
        }
        Ok(other) => print_outcome(other, worker.clients()),
        // Offline with nothing stored: a failed fetch, as a page would see it
        Err(e) if e.kind() == ErrorKind::Unavailable => {
          println!("failed to fetch: {}", e);
        }
        Err(e) => return Err(e.into()),
      }
    }
    Command::Stores => list_stores(&worker)?,
    Command::Message { json } => {
      let message = ControlMessage::decode(&json);
      deliver(&worker, &mut terminal, message).await?;
    }
    Command::Clear => deliver(&worker, &mut terminal, ControlMessage::ClearAll).await?,
    Command::Push { payload, click } => {
      let tag = match worker.handle(WorkerEvent::Push(payload)).await? {
        EventOutcome::Notified(notification) => {
          println!("[{}] {}", notification.title, notification.body);
          println!("  tag: {}  opens: {}", notification.tag, notification.url);
          println!(
            "  icon: {}  badge: {}  vibrate: {:?}",
            notification.icon, notification.badge, notification.vibrate
          );
          notification.tag
        }
        other => {
          print_outcome(other, worker.clients());
          return Ok(());
        }
      };
      if click {
        let outcome = worker
          .handle(WorkerEvent::NotificationClick { tag })
          .await?;
        print_outcome(outcome, worker.clients());
      }
    }
    Command::Sync { tag } => {
      let outcome = worker.handle(WorkerEvent::Sync { tag }).await?;
      print_outcome(outcome, worker.clients());
    }
  }

  worker.clients().remove(terminal.id);
  Ok(())
}

async fn deliver(worker: &Worker, terminal: &mut ClientHandle, message: ControlMessage) -> Result<()> {
  match message {
    // A waiting install only exists within this process, so bring one up first
    ControlMessage::SkipWaiting => {
      worker.lifecycle().restore().await?;
    }
    ControlMessage::ClearAll | ControlMessage::Unknown => {
      worker.clients().claim();
    }
  }

  let outcome = worker.handle(WorkerEvent::Message(message)).await?;
  print_outcome(outcome, worker.clients());

  while let Some(notice) = terminal.try_recv() {
    println!("client received: {}", serde_json::to_string(&notice)?);
  }
  Ok(())
}

fn list_stores(worker: &Worker) -> Result<()> {
  let cache = worker.cache();
  let names = cache.list_all()?;
  if names.is_empty() {
    println!("no stores");
    return Ok(());
  }

  println!("{:<32} {:>8}  {:<20} {:<20}", "STORE", "ENTRIES", "OLDEST", "NEWEST");
  for name in names {
    let store = cache.open(&name)?;
    let keys = cache.keys(&store)?;
    let stamp = |key: Option<&crate::http::RequestKey>| -> Result<String> {
      let entry = match key {
        Some(key) => cache.match_in(&store, key)?,
        None => None,
      };
      Ok(
        entry
          .map(|e| e.cached_at.format("%Y-%m-%d %H:%M:%S").to_string())
          .unwrap_or_else(|| "-".to_string()),
      )
    };
    let marker = if cache.version().owns(&name) { "" } else { " (stale)" };
    println!(
      "{:<32} {:>8}  {:<20} {:<20}",
      format!("{}{}", name, marker),
      keys.len(),
      stamp(keys.first())?,
      stamp(keys.last())?
    );
  }
  Ok(())
}

fn source_label(source: CacheSource) -> &'static str {
  match source {
    CacheSource::Network => "network",
    CacheSource::Cache => "cache",
    CacheSource::RootFallback => "cache (root document fallback)",
    CacheSource::ImageFallback => "cache (image fallback)",
  }
}

fn print_served(served: &Served, body: bool) {
  print_response(&served.response, source_label(served.source), body);
  if let Some(cached_at) = served.cached_at {
    println!("  cached at: {}", cached_at.format("%Y-%m-%d %H:%M:%S"));
  }
}

fn print_response(response: &Response, source: &str, body: bool) {
  println!("{} from {} ({} bytes)", response.status, source, response.body.len());
  if let Some(content_type) = response.header("content-type") {
    println!("  content-type: {}", content_type);
  }
  if body {
    println!("{}", String::from_utf8_lossy(&response.body));
  }
}

fn print_outcome(outcome: EventOutcome, clients: &Clients) {
  match outcome {
    EventOutcome::Done => println!("ok"),
    EventOutcome::Installed(InstallOutcome::Activated(report))
    | EventOutcome::Activated(report) => {
      for store in &report.purged {
        println!("removed stale store {}", store);
      }
      println!(
        "active ({} stale stores removed, {} clients claimed)",
        report.purged.len(),
        report.claimed
      );
    }
    EventOutcome::Installed(InstallOutcome::Waiting) => {
      println!("installed, waiting for skip-waiting")
    }
    EventOutcome::Installed(InstallOutcome::Resumed) => println!("already installed, active"),
    EventOutcome::PassThrough => println!("not intercepted"),
    EventOutcome::Respond(served) => print_served(&served, false),
    EventOutcome::Cleared(report) => println!(
      "cleared {} stores, notified {} clients",
      report.stores_deleted.len(),
      report.notified
    ),
    EventOutcome::Notified(notification) => {
      println!("[{}] {}", notification.title, notification.body)
    }
    EventOutcome::Clicked(ClickOutcome::Focused(id)) => match clients.get(id) {
      Some(client) if client.focused => println!("focused existing context at {}", client.url),
      _ => println!("focused client {:?}", id),
    },
    EventOutcome::Clicked(ClickOutcome::Opened(handle)) => match clients.get(handle.id) {
      Some(client) => println!("opened new context at {}", client.url),
      None => println!("opened client {:?}", handle.id),
    },
    EventOutcome::Clicked(ClickOutcome::Missing) => println!("no such notification"),
  }
}
