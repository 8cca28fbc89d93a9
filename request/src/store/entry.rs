use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

/// A committed result held by a cache provider.
///
/// One entry exists per cache key. It is overwritten on every committed
/// result and removed on expiration or explicit invalidation.
pub struct CacheEntry<P, D> {
  /// The cache key this entry belongs to.
  pub key: String,
  /// The committed data, shared with every request reading this key.
  pub data: Arc<D>,
  /// The params of the call that produced `data`, if known.
  pub params: Option<P>,
  /// When the entry was written.
  pub inserted_at: Instant,
  /// When the entry expires. `None` means it never does.
  pub expires_at: Option<Instant>,
}

impl<P, D> CacheEntry<P, D> {
  /// Creates a new entry stamped with the current time.
  pub fn new(key: impl Into<String>, data: Arc<D>, params: Option<P>, ttl: Option<Duration>) -> Self {
    let now = Instant::now();
    Self {
      key: key.into(),
      data,
      params,
      inserted_at: now,
      expires_at: ttl.map(|ttl| now + ttl),
    }
  }

  /// Checks if the entry's expiration time has passed.
  #[inline]
  pub fn is_expired(&self) -> bool {
    self
      .expires_at
      .map_or(false, |expires_at| Instant::now() >= expires_at)
  }

  /// Returns how long the entry has left to live, or `None` if it never expires.
  pub fn ttl_remaining(&self) -> Option<Duration> {
    self
      .expires_at
      .map(|expires_at| expires_at.saturating_duration_since(Instant::now()))
  }
}

// Manual implementation so `D` does not need to be `Clone`.
impl<P: Clone, D> Clone for CacheEntry<P, D> {
  fn clone(&self) -> Self {
    Self {
      key: self.key.clone(),
      data: Arc::clone(&self.data),
      params: self.params.clone(),
      inserted_at: self.inserted_at,
      expires_at: self.expires_at,
    }
  }
}

impl<P, D> fmt::Debug for CacheEntry<P, D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheEntry")
      .field("key", &self.key)
      .field("has_params", &self.params.is_some())
      .field("inserted_at", &self.inserted_at)
      .field("expires_at", &self.expires_at)
      .finish_non_exhaustive()
  }
}
