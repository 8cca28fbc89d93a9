// This entire module is only compiled when the 'serde' feature is enabled.
#![cfg(feature = "serde")]

use crate::error::{BuildError, CacheError};
use crate::store::{CacheStore, CacheStoreBuilder};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// An internal, serializable representation of a single cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct PersistentEntry<P, D> {
  pub(crate) key: String,
  pub(crate) data: D,
  pub(crate) params: Option<P>,
  // Remaining time to live.
  pub(crate) ttl_remaining: Option<Duration>,
}

/// A serializable, point-in-time snapshot of a store's entries.
///
/// Created with [`CacheStore::to_snapshot()`] and restored with
/// [`CacheStoreBuilder::build_from_snapshot()`]. Any `serde` format works.
/// Remaining expiration is carried over, so an entry restored from a snapshot
/// expires when it would have in the original store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSnapshot<P, D> {
  pub(crate) entries: Vec<PersistentEntry<P, D>>,
}

impl<P, D> CacheSnapshot<P, D> {
  /// The number of entries captured.
  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

impl<P, D> CacheStore<P, D>
where
  P: Clone + PartialEq + Send + Sync + 'static,
  D: Clone + Send + Sync + 'static,
{
  /// Captures every entry currently held by the provider.
  ///
  /// Entries whose expiration already passed are left out.
  pub fn to_snapshot(&self) -> Result<CacheSnapshot<P, D>, CacheError> {
    let mut entries = Vec::new();
    for key in self.keys()? {
      let Some(entry) = self.get(&key)? else {
        continue;
      };
      if entry.is_expired() {
        continue;
      }
      let ttl_remaining = self
        .shared
        .deadlines
        .lock()
        .get(&key)
        .map(|deadline| deadline.saturating_duration_since(tokio::time::Instant::now()))
        .or_else(|| entry.ttl_remaining());
      entries.push(PersistentEntry {
        key,
        data: (*entry.data).clone(),
        params: entry.params,
        ttl_remaining,
      });
    }
    Ok(CacheSnapshot { entries })
  }
}

impl<P, D> CacheStoreBuilder<P, D>
where
  P: Clone + PartialEq + Send + Sync + DeserializeOwned + 'static,
  D: Send + Sync + DeserializeOwned + 'static,
{
  /// Builds a store and pre-populates it from a snapshot.
  ///
  /// Entries keep their remaining time to live when the store has expiration
  /// enabled; otherwise they never expire.
  pub fn build_from_snapshot(self, snapshot: CacheSnapshot<P, D>) -> Result<CacheStore<P, D>, BuildError> {
    let store = self.build()?;
    for p_entry in snapshot.entries {
      let ttl = match (store.shared.expiration, p_entry.ttl_remaining) {
        (Some(_), Some(remaining)) => Some(remaining),
        (Some(full), None) => Some(full),
        (None, _) => None,
      };
      let entry = crate::store::CacheEntry::new(&p_entry.key, Arc::new(p_entry.data), p_entry.params, ttl);
      if let Err(e) = store.shared.provider.set(&p_entry.key, entry) {
        tracing::warn!(key = %p_entry.key, error = %e, "failed to restore cache entry");
        continue;
      }
      if let Some(ttl) = ttl {
        store.restart_timer(&p_entry.key, ttl);
      }
    }
    Ok(store)
  }
}
