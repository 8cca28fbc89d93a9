//! Cross-instance coherence: a publish/subscribe channel whose topics are
//! cache keys.
//!
//! Every request reading a key subscribes to that key's topic, regardless of
//! which request (or which global `mutate`) changed the entry. The bus belongs
//! to the `CacheStore`, not to any request, so it outlives individual
//! requests.

use std::fmt;

use fibre::spmc::topic::{self, AsyncTopicReceiver, AsyncTopicSender};
use parking_lot::Mutex;

/// What happened to a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheEvent {
  /// The entry was written, or a write was skipped because the value was
  /// unchanged. Readers should re-read the entry.
  Set,
  /// The entry was explicitly invalidated.
  Deleted,
  /// The entry's expiration timer fired and the entry was removed.
  Expired,
}

impl fmt::Display for CacheEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheEvent::Set => write!(f, "set"),
      CacheEvent::Deleted => write!(f, "deleted"),
      CacheEvent::Expired => write!(f, "expired"),
    }
  }
}

// Per-subscriber mailbox size. A full mailbox drops the newest event, so
// subscribers must not rely on seeing every event: a wake means "re-read the
// entry and compare the key's invalidation epoch".
const MAILBOX_CAPACITY: usize = 16;

pub(crate) struct CacheBus {
  sender: AsyncTopicSender<String, CacheEvent>,
  // Never subscribed to anything. Kept so the channel stays open while no
  // request is listening, and cloned to hand out new subscriptions.
  template: Mutex<AsyncTopicReceiver<String, CacheEvent>>,
}

impl CacheBus {
  pub(crate) fn new() -> Self {
    let (sender, template) = topic::channel_async(MAILBOX_CAPACITY);
    Self {
      sender,
      template: Mutex::new(template),
    }
  }

  pub(crate) fn publish(&self, key: &str, event: CacheEvent) {
    tracing::trace!(key = %key, event = %event, "publishing cache event");
    if self.sender.send(key.to_owned(), event).is_err() {
      tracing::debug!(key = %key, "cache event bus closed");
    }
  }

  pub(crate) fn subscribe(&self, key: &str) -> CacheSubscription {
    let receiver = self.template.lock().clone();
    receiver.subscribe(key.to_owned());
    CacheSubscription {
      receiver,
      key: Some(key.to_owned()),
    }
  }
}

impl fmt::Debug for CacheBus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheBus").finish_non_exhaustive()
  }
}

/// A live subscription to one cache key's events.
pub struct CacheSubscription {
  receiver: AsyncTopicReceiver<String, CacheEvent>,
  key: Option<String>,
}

impl CacheSubscription {
  /// Waits for the next event on the subscribed key.
  ///
  /// Returns `None` once the store's bus has been closed.
  pub async fn recv(&self) -> Option<(String, CacheEvent)> {
    self.receiver.recv().await.ok()
  }

  /// The key currently subscribed to.
  pub fn key(&self) -> Option<&str> {
    self.key.as_deref()
  }

  /// Moves this subscription to another key.
  pub fn rekey(&mut self, key: &str) {
    if self.key.as_deref() == Some(key) {
      return;
    }
    if let Some(old) = self.key.take() {
      self.receiver.unsubscribe(&old);
    }
    self.receiver.subscribe(key.to_owned());
    self.key = Some(key.to_owned());
  }
}

impl fmt::Debug for CacheSubscription {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheSubscription")
      .field("key", &self.key)
      .finish()
  }
}
