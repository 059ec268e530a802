//! Execution contexts (pages, windows) the worker can see and control.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;

use super::control::ClientMessage;

/// Unique identifier for a client context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
  fn next() -> Self {
    static COUNTER: AtomicU64 = AtomicU64::new(1);
    Self(COUNTER.fetch_add(1, Ordering::Relaxed))
  }
}

/// Snapshot of a client context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientInfo {
  pub id: ClientId,
  pub url: String,
  /// Whether this worker controls the context
  pub controlled: bool,
  pub focused: bool,
}

/// The context's side of the connection: its message inbox.
#[derive(Debug)]
pub struct ClientHandle {
  pub id: ClientId,
  inbox: mpsc::UnboundedReceiver<ClientMessage>,
}

impl ClientHandle {
  /// Next delivered message, if one is waiting.
  pub fn try_recv(&mut self) -> Option<ClientMessage> {
    self.inbox.try_recv().ok()
  }
}

struct Slot {
  info: ClientInfo,
  tx: mpsc::UnboundedSender<ClientMessage>,
}

/// Registry of every open context in the worker's scope.
#[derive(Default)]
pub struct Clients {
  slots: Mutex<Vec<Slot>>,
}

impl Clients {
  pub fn new() -> Self {
    Self::default()
  }

  fn slots(&self) -> MutexGuard<'_, Vec<Slot>> {
    self.slots.lock().unwrap_or_else(PoisonError::into_inner)
  }

  fn insert(&self, url: &str, controlled: bool, focused: bool) -> ClientHandle {
    let (tx, inbox) = mpsc::unbounded_channel();
    let id = ClientId::next();
    let mut slots = self.slots();
    if focused {
      slots.iter_mut().for_each(|s| s.info.focused = false);
    }
    slots.push(Slot {
      info: ClientInfo {
        id,
        url: url.to_string(),
        controlled,
        focused,
      },
      tx,
    });
    ClientHandle { id, inbox }
  }

  /// Register a context that loaded before this worker took control.
  pub fn add(&self, url: &str) -> ClientHandle {
    self.insert(url, false, false)
  }

  pub fn remove(&self, id: ClientId) -> bool {
    let mut slots = self.slots();
    let before = slots.len();
    slots.retain(|s| s.info.id != id);
    slots.len() != before
  }

  pub fn get(&self, id: ClientId) -> Option<ClientInfo> {
    self
      .slots()
      .iter()
      .find(|s| s.info.id == id)
      .map(|s| s.info.clone())
  }

  pub fn match_all(&self, include_uncontrolled: bool) -> Vec<ClientInfo> {
    self
      .slots()
      .iter()
      .filter(|s| include_uncontrolled || s.info.controlled)
      .map(|s| s.info.clone())
      .collect()
  }

  /// Take control of every open context without waiting for a reload.
  pub fn claim(&self) -> usize {
    let mut slots = self.slots();
    let mut claimed = 0;
    for slot in slots.iter_mut().filter(|s| !s.info.controlled) {
      slot.info.controlled = true;
      claimed += 1;
    }
    claimed
  }

  /// Focus one context. Returns false when it no longer exists.
  pub fn focus(&self, id: ClientId) -> bool {
    let mut slots = self.slots();
    if !slots.iter().any(|s| s.info.id == id) {
      return false;
    }
    for slot in slots.iter_mut() {
      slot.info.focused = slot.info.id == id;
    }
    true
  }

  /// Open a new focused context at `url`, controlled by this worker.
  pub fn open_window(&self, url: &str) -> ClientHandle {
    self.insert(url, true, true)
  }

  /// Deliver `message` to every controlled context. Returns how many received it.
  pub fn post_to_controlled(&self, message: &ClientMessage) -> usize {
    self
      .slots()
      .iter()
      .filter(|s| s.info.controlled)
      .filter(|s| s.tx.send(message.clone()).is_ok())
      .count()
  }
}
