//! Push notifications and what happens when the user clicks one.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use tracing::info;

use super::clients::{ClientHandle, ClientId, Clients};
use crate::config::NotificationConfig;

/// A user-facing notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
  pub title: String,
  pub body: String,
  pub icon: String,
  pub badge: String,
  pub vibrate: Vec<u32>,
  /// Showing a notification with a tag already on screen replaces it
  pub tag: String,
  /// Location to bring up when clicked
  pub url: String,
}

/// What a click on a notification did.
#[derive(Debug)]
pub enum ClickOutcome {
  /// An open context already showed the target and was focused
  Focused(ClientId),
  /// No context showed the target, so one was opened
  Opened(ClientHandle),
  /// No notification with that tag was on display
  Missing,
}

/// Builds notifications from push events and routes clicks back to a context.
pub struct NotificationDispatcher {
  config: NotificationConfig,
  shown: Mutex<HashMap<String, Notification>>,
}

impl NotificationDispatcher {
  pub fn new(config: NotificationConfig) -> Self {
    Self {
      config,
      shown: Mutex::new(HashMap::new()),
    }
  }

  /// Show a notification for a push event. Without a payload the body is the default one.
  pub fn on_push(&self, payload: Option<&str>) -> Notification {
    let body = payload
      .unwrap_or(self.config.default_body.as_str())
      .to_string();

    let notification = Notification {
      title: self.config.title.clone(),
      body,
      icon: self.config.icon.clone(),
      badge: self.config.badge.clone(),
      vibrate: self.config.vibrate.clone(),
      tag: self.config.tag.clone(),
      url: self.config.url.clone(),
    };

    info!(tag = %notification.tag, "showing notification");
    self
      .shown
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(notification.tag.clone(), notification.clone());
    notification
  }

  /// Notifications currently on display.
  #[cfg(test)]
  pub fn shown(&self) -> Vec<Notification> {
    self
      .shown
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .values()
      .cloned()
      .collect()
  }

  /// Close the notification, then focus a context at its target or open one.
  pub fn on_click(&self, tag: &str, clients: &Clients) -> ClickOutcome {
    let closed = self
      .shown
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(tag);
    let Some(notification) = closed else {
      return ClickOutcome::Missing;
    };

    let existing = clients
      .match_all(true)
      .into_iter()
      .find(|c| c.url == notification.url);

    if let Some(client) = existing {
      if clients.focus(client.id) {
        return ClickOutcome::Focused(client.id);
      }
    }

    ClickOutcome::Opened(clients.open_window(&notification.url))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn dispatcher() -> NotificationDispatcher {
    NotificationDispatcher::new(NotificationConfig::default())
  }

  #[test]
  fn test_only_a_missing_payload_gets_the_default_body() {
    let d = dispatcher();
    assert_eq!(d.on_push(None).body, "New update available");
    assert_eq!(d.on_push(Some("")).body, "");
    assert_eq!(d.on_push(Some("Build 42 is out")).body, "Build 42 is out");
  }

  #[test]
  fn test_same_tag_replaces() {
    let d = dispatcher();
    d.on_push(Some("first"));
    d.on_push(Some("second"));
    let shown = d.shown();
    assert_eq!(shown.len(), 1);
    assert_eq!(shown[0].body, "second");
  }

  #[test]
  fn test_click_focuses_existing_context() {
    let d = dispatcher();
    let clients = Clients::new();
    let _other = clients.add("/about");
    let home = clients.add("/");
    let notification = d.on_push(None);

    match d.on_click(&notification.tag, &clients) {
      ClickOutcome::Focused(id) => assert_eq!(id, home.id),
      other => panic!("expected focus, got {:?}", other),
    }
    assert_eq!(clients.match_all(true).len(), 2);
    assert!(d.shown().is_empty());
  }

  #[test]
  fn test_click_opens_when_no_context_matches() {
    let d = dispatcher();
    let clients = Clients::new();
    clients.add("/about");
    let notification = d.on_push(None);

    match d.on_click(&notification.tag, &clients) {
      ClickOutcome::Opened(handle) => {
        assert_eq!(clients.get(handle.id).unwrap().url, "/");
      }
      other => panic!("expected open, got {:?}", other),
    }
    assert_eq!(clients.match_all(true).len(), 2);
  }

  #[test]
  fn test_click_on_dismissed_notification_does_nothing() {
    let d = dispatcher();
    let clients = Clients::new();
    assert!(matches!(d.on_click("nope", &clients), ClickOutcome::Missing));
    assert!(clients.match_all(true).is_empty());
  }
}
