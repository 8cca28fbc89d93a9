use crate::error::CacheError;
use crate::store::entry::CacheEntry;

use core::fmt;

use ahash::{HashMap, HashMapExt};
use parking_lot::RwLock;

/// The storage contract behind a `CacheStore`.
///
/// The default is [`MemoryProvider`]. Any type satisfying this contract can be
/// plugged in instead, for example one backed by persistent storage. Each
/// method may fail; failures surface to the caller that touched the cache.
pub trait CacheProvider<P, D>: Send + Sync {
  fn get(&self, key: &str) -> Result<Option<CacheEntry<P, D>>, CacheError>;

  fn set(&self, key: &str, entry: CacheEntry<P, D>) -> Result<(), CacheError>;

  fn delete(&self, key: &str) -> Result<(), CacheError>;

  fn keys(&self) -> Result<Vec<String>, CacheError>;
}

/// An in-process provider backed by a single locked hash map.
pub struct MemoryProvider<P, D> {
  map: RwLock<HashMap<String, CacheEntry<P, D>>>,
}

impl<P, D> MemoryProvider<P, D> {
  pub fn new() -> Self {
    Self {
      map: RwLock::new(HashMap::new()),
    }
  }

  /// Returns the number of entries currently held.
  pub fn len(&self) -> usize {
    self.map.read().len()
  }

  pub fn is_empty(&self) -> bool {
    self.map.read().is_empty()
  }
}

impl<P, D> Default for MemoryProvider<P, D> {
  fn default() -> Self {
    Self::new()
  }
}

impl<P, D> fmt::Debug for MemoryProvider<P, D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MemoryProvider")
      .field("len", &self.len())
      .finish()
  }
}

impl<P, D> CacheProvider<P, D> for MemoryProvider<P, D>
where
  P: Clone + Send + Sync,
  D: Send + Sync,
{
  fn get(&self, key: &str) -> Result<Option<CacheEntry<P, D>>, CacheError> {
    Ok(self.map.read().get(key).cloned())
  }

  fn set(&self, key: &str, entry: CacheEntry<P, D>) -> Result<(), CacheError> {
    self.map.write().insert(key.to_owned(), entry);
    Ok(())
  }

  fn delete(&self, key: &str) -> Result<(), CacheError> {
    self.map.write().remove(key);
    Ok(())
  }

  fn keys(&self) -> Result<Vec<String>, CacheError> {
    Ok(self.map.read().keys().cloned().collect())
  }
}
