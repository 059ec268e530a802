//! The worker: one host that receives every event kind and dispatches it
//! to the lifecycle, strategy, control, or notification component.

mod clients;
mod control;
mod lifecycle;
mod notify;

pub use clients::{ClientHandle, Clients};
pub use control::{ClearReport, ControlMessage};
pub use lifecycle::{ActivationReport, InstallOutcome, Lifecycle, LifecycleState};
pub use notify::{ClickOutcome, Notification, NotificationDispatcher};

use std::sync::Arc;
use tracing::{debug, info};

use crate::cache::{CacheManager, Served, StoreBackend, StrategyEngine, VersionTag};
use crate::config::Config;
use crate::error::Result;
use crate::fetch::Fetcher;
use crate::http::Request;

/// Background sync tag the worker acknowledges.
pub const SYNC_DATA_TAG: &str = "sync-data";

/// Every event the worker handles.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
  Install,
  Activate,
  /// An outbound request from a client context
  Fetch(Request),
  Message(ControlMessage),
  /// A push from the origin, with its optional text payload
  Push(Option<String>),
  NotificationClick { tag: String },
  Sync { tag: String },
}

/// Result of handling one event.
#[derive(Debug)]
pub enum EventOutcome {
  /// Handled with nothing to report
  Done,
  Installed(InstallOutcome),
  Activated(ActivationReport),
  /// Not intercepted; the request continues as ordinary network traffic
  PassThrough,
  /// This response settles the request
  Respond(Served),
  Cleared(ClearReport),
  Notified(Notification),
  Clicked(ClickOutcome),
}

pub struct Worker {
  cache: Arc<CacheManager>,
  clients: Arc<Clients>,
  lifecycle: Lifecycle,
  strategies: StrategyEngine,
  notifications: NotificationDispatcher,
}

impl Worker {
  pub fn new(
    config: &Config,
    backend: Arc<dyn StoreBackend>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Result<Self> {
    let cache = Arc::new(CacheManager::new(
      backend,
      VersionTag::new(config.version.clone())?,
    ));
    let clients = Arc::new(Clients::new());
    let lifecycle = Lifecycle::new(config, cache.clone(), fetcher.clone(), clients.clone())?;
    let strategies = StrategyEngine::new(config, cache.clone(), fetcher)?;

    Ok(Self {
      cache,
      clients,
      lifecycle,
      strategies,
      notifications: NotificationDispatcher::new(config.notifications.clone()),
    })
  }

  pub fn cache(&self) -> &CacheManager {
    &self.cache
  }

  pub fn clients(&self) -> &Clients {
    &self.clients
  }

  pub fn lifecycle(&self) -> &Lifecycle {
    &self.lifecycle
  }

  pub async fn handle(&self, event: WorkerEvent) -> Result<EventOutcome> {
    match event {
      WorkerEvent::Install => Ok(EventOutcome::Installed(self.lifecycle.install().await?)),
      WorkerEvent::Activate => Ok(EventOutcome::Activated(self.lifecycle.activate()?)),
      WorkerEvent::Fetch(request) => self.on_fetch(&request).await,
      WorkerEvent::Message(message) => self.on_message(message),
      WorkerEvent::Push(payload) => Ok(EventOutcome::Notified(
        self.notifications.on_push(payload.as_deref()),
      )),
      WorkerEvent::NotificationClick { tag } => Ok(EventOutcome::Clicked(
        self.notifications.on_click(&tag, &self.clients),
      )),
      WorkerEvent::Sync { tag } => {
        if tag == SYNC_DATA_TAG {
          info!(%tag, "background sync");
        } else {
          debug!(%tag, "ignoring unknown sync tag");
        }
        Ok(EventOutcome::Done)
      }
    }
  }

  async fn on_fetch(&self, request: &Request) -> Result<EventOutcome> {
    // Requests are only intercepted once the worker is in control
    if self.lifecycle.state() != LifecycleState::Active {
      return Ok(EventOutcome::PassThrough);
    }

    Ok(match self.strategies.handle(request).await? {
      Some(served) => EventOutcome::Respond(served),
      None => EventOutcome::PassThrough,
    })
  }

  fn on_message(&self, message: ControlMessage) -> Result<EventOutcome> {
    match message {
      ControlMessage::SkipWaiting => Ok(match self.lifecycle.skip_waiting()? {
        Some(report) => EventOutcome::Activated(report),
        None => EventOutcome::Done,
      }),
      ControlMessage::ClearAll => Ok(EventOutcome::Cleared(control::clear_all(
        &self.cache,
        &self.clients,
      )?)),
      ControlMessage::Unknown => {
        debug!("ignoring unknown control message");
        Ok(EventOutcome::Done)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::control::ClientMessage;
  use super::*;
  use crate::cache::{CacheSource, SqliteStorage, StoreRole};
  use crate::error::ErrorKind;
  use crate::fetch::testing::StubFetcher;
  use crate::http::{Destination, Response};

  const ORIGIN: &str = "https://example.com";

  fn worker(extra: &str) -> (Worker, Arc<StubFetcher>) {
    let config = Config::from_yaml(&format!(
      "origin: {}\nversion: v1\nstatic_assets: [\"/\", \"/favicon.svg\"]\n{}",
      ORIGIN, extra
    ))
    .unwrap();
    let net = Arc::new(
      StubFetcher::new()
        .route(&format!("{}/", ORIGIN), Response::new(200, "home"))
        .route(&format!("{}/favicon.svg", ORIGIN), Response::new(200, "<svg/>")),
    );
    let worker = Worker::new(
      &config,
      Arc::new(SqliteStorage::in_memory().unwrap()),
      net.clone(),
    )
    .unwrap();
    (worker, net)
  }

  fn get(path: &str) -> Request {
    Request::parse("GET", &format!("{}{}", ORIGIN, path))
      .unwrap()
      .with_destination(Destination::Document)
  }

  fn respond(outcome: EventOutcome) -> Served {
    match outcome {
      EventOutcome::Respond(served) => served,
      other => panic!("expected a response, got {:?}", other),
    }
  }

  #[tokio::test]
  async fn test_install_activate_then_serve_offline() {
    let (worker, net) = worker("");

    match worker.handle(WorkerEvent::Install).await.unwrap() {
      EventOutcome::Installed(InstallOutcome::Activated(report)) => {
        assert!(report.purged.is_empty())
      }
      other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(worker.cache().list_all().unwrap(), vec!["v1-static"]);

    // "/" itself is precached, so it is answered from the static store
    let home = respond(worker.handle(WorkerEvent::Fetch(get("/"))).await.unwrap());
    assert_eq!(home.source, CacheSource::Cache);

    // A page outside the static list goes network-first into v1-dynamic
    net.set(&format!("{}/news", ORIGIN), Response::new(200, "news"));
    let first = respond(worker.handle(WorkerEvent::Fetch(get("/news"))).await.unwrap());
    assert_eq!(first.source, CacheSource::Network);

    let dynamic = worker.cache().open_role(StoreRole::Dynamic).unwrap();
    assert_eq!(dynamic.name(), "v1-dynamic");
    assert_eq!(worker.cache().keys(&dynamic).unwrap().len(), 1);

    net.set_offline(true);
    let second = respond(worker.handle(WorkerEvent::Fetch(get("/news"))).await.unwrap());
    assert_eq!(second.source, CacheSource::Cache);
    assert_eq!(second.response.body, first.response.body);
  }

  #[tokio::test]
  async fn test_clear_all_empties_stores_and_notifies_every_context() {
    let (worker, net) = worker("");
    let mut home = worker.clients().add("/");
    let mut about = worker.clients().add("/about");
    worker.handle(WorkerEvent::Install).await.unwrap();

    for path in ["/news", "/img/a.png"] {
      net.set(&format!("{}{}", ORIGIN, path), Response::new(200, "x"));
    }
    worker.handle(WorkerEvent::Fetch(get("/news"))).await.unwrap();
    let image = Request::parse("GET", &format!("{}/img/a.png", ORIGIN))
      .unwrap()
      .with_destination(Destination::Image);
    worker.handle(WorkerEvent::Fetch(image)).await.unwrap();
    assert_eq!(worker.cache().list_all().unwrap().len(), 3);

    let message = ControlMessage::decode(r#"{"type":"clear-all"}"#);
    match worker.handle(WorkerEvent::Message(message)).await.unwrap() {
      EventOutcome::Cleared(report) => {
        assert_eq!(report.stores_deleted.len(), 3);
        assert_eq!(report.notified, 2);
      }
      other => panic!("unexpected outcome {:?}", other),
    }

    for role in [StoreRole::Static, StoreRole::Dynamic, StoreRole::Image] {
      let store = worker.cache().open_role(role).unwrap();
      assert!(worker.cache().keys(&store).unwrap().is_empty());
    }
    assert_eq!(home.try_recv(), Some(ClientMessage::Cleared));
    assert_eq!(about.try_recv(), Some(ClientMessage::Cleared));
  }

  #[tokio::test]
  async fn test_requests_pass_through_until_active() {
    let (worker, net) = worker("");
    let outcome = worker.handle(WorkerEvent::Fetch(get("/"))).await.unwrap();
    assert!(matches!(outcome, EventOutcome::PassThrough));
    assert_eq!(net.calls(), 0);
  }

  #[tokio::test]
  async fn test_skip_waiting_message_activates_waiting_worker() {
    let (worker, _net) = worker("fast_activation: false");
    worker.handle(WorkerEvent::Install).await.unwrap();
    assert_eq!(worker.lifecycle().state(), LifecycleState::Installed);

    let outcome = worker
      .handle(WorkerEvent::Message(ControlMessage::SkipWaiting))
      .await
      .unwrap();
    assert!(matches!(outcome, EventOutcome::Activated(_)));
    assert_eq!(worker.lifecycle().state(), LifecycleState::Active);
  }

  #[tokio::test]
  async fn test_unknown_message_is_ignored() {
    let (worker, _net) = worker("");
    worker.handle(WorkerEvent::Install).await.unwrap();
    let outcome = worker
      .handle(WorkerEvent::Message(ControlMessage::decode(r#"{"type":"ping"}"#)))
      .await
      .unwrap();
    assert!(matches!(outcome, EventOutcome::Done));
    assert_eq!(worker.cache().list_all().unwrap(), vec!["v1-static"]);
  }

  #[tokio::test]
  async fn test_non_get_passes_through_while_active() {
    let (worker, net) = worker("");
    worker.handle(WorkerEvent::Install).await.unwrap();
    let calls = net.calls();

    let post = Request::parse("POST", &format!("{}/contact", ORIGIN)).unwrap();
    for _ in 0..2 {
      let outcome = worker.handle(WorkerEvent::Fetch(post.clone())).await.unwrap();
      assert!(matches!(outcome, EventOutcome::PassThrough));
    }
    assert_eq!(net.calls(), calls);
  }

  #[tokio::test]
  async fn test_offline_unknown_resource_is_a_failed_fetch() {
    let (worker, net) = worker("");
    worker.handle(WorkerEvent::Install).await.unwrap();
    net.set_offline(true);

    let data = Request::parse("GET", &format!("{}/data.json", ORIGIN)).unwrap();
    let err = worker.handle(WorkerEvent::Fetch(data)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unavailable);
  }

  #[tokio::test]
  async fn test_push_and_click_round_trip() {
    let (worker, _net) = worker("");
    let notification = match worker
      .handle(WorkerEvent::Push(Some("Deploy finished".into())))
      .await
      .unwrap()
    {
      EventOutcome::Notified(n) => n,
      other => panic!("unexpected outcome {:?}", other),
    };
    assert_eq!(notification.body, "Deploy finished");

    let outcome = worker
      .handle(WorkerEvent::NotificationClick {
        tag: notification.tag.clone(),
      })
      .await
      .unwrap();
    assert!(matches!(outcome, EventOutcome::Clicked(ClickOutcome::Opened(_))));

    // A second push + click finds the window the first click opened
    worker.handle(WorkerEvent::Push(None)).await.unwrap();
    let outcome = worker
      .handle(WorkerEvent::NotificationClick {
        tag: notification.tag,
      })
      .await
      .unwrap();
    assert!(matches!(outcome, EventOutcome::Clicked(ClickOutcome::Focused(_))));
  }

  #[tokio::test]
  async fn test_sync_is_acknowledged() {
    let (worker, _net) = worker("");
    for tag in [SYNC_DATA_TAG, "something-else"] {
      let outcome = worker
        .handle(WorkerEvent::Sync { tag: tag.to_string() })
        .await
        .unwrap();
      assert!(matches!(outcome, EventOutcome::Done));
    }
  }
}
