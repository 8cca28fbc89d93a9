//! The cache store shared by requests.
//!
//! A `CacheStore` is an explicitly injected service: requests that should see
//! each other's results are built with clones of the same store. It combines a
//! pluggable [`CacheProvider`], per-key expiration driven by a timer wheel, and
//! an event bus keyed by cache key.

pub(crate) mod bus;
pub(crate) mod entry;
pub(crate) mod janitor;
pub(crate) mod provider;
#[cfg(feature = "serde")]
pub(crate) mod snapshot;
pub(crate) mod timer;

use crate::error::{BuildError, CacheError};
use crate::metrics::{StoreMetrics, StoreMetricsSnapshot};
use crate::runtime::TokioSpawner;

use bus::CacheBus;
use janitor::Janitor;
use timer::TimerWheel;

pub use bus::{CacheEvent, CacheSubscription};
pub use entry::CacheEntry;
pub use provider::{CacheProvider, MemoryProvider};
#[cfg(feature = "serde")]
pub use snapshot::CacheSnapshot;
pub use timer::TimerWheelMode;

use core::fmt;
use std::sync::Arc;
use std::time::Duration;

use ahash::{HashMap, HashMapExt};
use parking_lot::Mutex;
use tokio::time::Instant;

/// Selects the cache keys a global [`CacheStore::mutate`] applies to.
pub enum KeyFilter {
  /// These keys exactly, whether or not they currently hold an entry.
  Keys(Vec<String>),
  /// Every key currently known to the provider for which the predicate holds.
  Predicate(Arc<dyn Fn(&str) -> bool + Send + Sync>),
}

impl KeyFilter {
  /// A filter matching a single key.
  pub fn key(key: impl Into<String>) -> Self {
    KeyFilter::Keys(vec![key.into()])
  }

  /// A filter matching known keys for which `f` returns `true`.
  pub fn predicate(f: impl Fn(&str) -> bool + Send + Sync + 'static) -> Self {
    KeyFilter::Predicate(Arc::new(f))
  }
}

impl<S: Into<String>> From<Vec<S>> for KeyFilter {
  fn from(keys: Vec<S>) -> Self {
    KeyFilter::Keys(keys.into_iter().map(Into::into).collect())
  }
}

impl<const N: usize> From<[&str; N]> for KeyFilter {
  fn from(keys: [&str; N]) -> Self {
    KeyFilter::Keys(keys.iter().map(|key| key.to_string()).collect())
  }
}

impl From<&str> for KeyFilter {
  fn from(key: &str) -> Self {
    KeyFilter::key(key)
  }
}

impl fmt::Debug for KeyFilter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      KeyFilter::Keys(keys) => f.debug_tuple("Keys").field(keys).finish(),
      KeyFilter::Predicate(_) => f.write_str("Predicate(..)"),
    }
  }
}

/// A replacement for cached or visible data: a literal value, or an updater
/// that receives the previous data and returns the next.
pub enum Mutation<D> {
  Value(Arc<D>),
  Update(Box<dyn Fn(Option<&Arc<D>>) -> Arc<D> + Send + Sync>),
}

impl<D> Mutation<D> {
  /// A literal replacement value.
  pub fn value(data: D) -> Self {
    Mutation::Value(Arc::new(data))
  }

  /// An updater computing the next data from the previous one.
  pub fn update(f: impl Fn(Option<&Arc<D>>) -> D + Send + Sync + 'static) -> Self {
    Mutation::Update(Box::new(move |prev| Arc::new(f(prev))))
  }

  /// Produces the next data given the previous data.
  pub fn apply(&self, prev: Option<&Arc<D>>) -> Arc<D> {
    match self {
      Mutation::Value(data) => Arc::clone(data),
      Mutation::Update(f) => f(prev),
    }
  }
}

impl<D> fmt::Debug for Mutation<D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Mutation::Value(_) => f.write_str("Value(..)"),
      Mutation::Update(_) => f.write_str("Update(..)"),
    }
  }
}

/// The internal, shared core of a `CacheStore`.
pub(crate) struct StoreShared<P, D> {
  pub(crate) provider: Arc<dyn CacheProvider<P, D>>,
  pub(crate) expiration: Option<Duration>,
  pub(crate) timer_wheel: Option<TimerWheel>,
  // Per-key expiration deadlines. Authoritative over both the wheel and the
  // provider's `expires_at`, since a skipped write still restarts the timer.
  pub(crate) deadlines: Mutex<HashMap<String, Instant>>,
  // Per-key count of deletions and expirations. Bumped before the event is
  // published, so a listener whose mailbox dropped the event still sees the
  // invalidation on its next wake.
  pub(crate) invalidations: Mutex<HashMap<String, u64>>,
  pub(crate) bus: CacheBus,
  pub(crate) metrics: StoreMetrics,
  janitor: Mutex<Option<Janitor>>,
}

impl<P, D> StoreShared<P, D> {
  pub(crate) fn record_invalidation(&self, key: &str) {
    *self.invalidations.lock().entry(key.to_owned()).or_insert(0) += 1;
  }
}

impl<P, D> Drop for StoreShared<P, D> {
  fn drop(&mut self) {
    if let Some(janitor) = self.janitor.get_mut().take() {
      janitor.stop();
    }
  }
}

/// A cheaply cloneable handle to a shared cache.
///
/// # Examples
///
/// ```ignore
/// let store: CacheStore<u32, String> = CacheStore::new();
/// store.set("user:1", Arc::new("Ada".to_string()), Some(1))?;
/// assert_eq!(*store.get("user:1")?.unwrap().data, "Ada");
/// ```
pub struct CacheStore<P, D> {
  pub(crate) shared: Arc<StoreShared<P, D>>,
}

impl<P, D> Clone for CacheStore<P, D> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<P, D> fmt::Debug for CacheStore<P, D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheStore")
      .field("expiration", &self.shared.expiration)
      .field("metrics", &self.shared.metrics.snapshot())
      .finish_non_exhaustive()
  }
}

impl<P, D> CacheStore<P, D>
where
  P: Clone + PartialEq + Send + Sync + 'static,
  D: Send + Sync + 'static,
{
  /// Creates an in-memory store without expiration.
  ///
  /// Does not need a runtime. Use [`CacheStore::builder`] for expiration or a
  /// custom provider.
  pub fn new() -> Self {
    Self::from_parts(Arc::new(MemoryProvider::new()), None, None)
  }

  pub fn builder() -> CacheStoreBuilder<P, D> {
    CacheStoreBuilder::new()
  }

  fn from_parts(
    provider: Arc<dyn CacheProvider<P, D>>,
    expiration: Option<Duration>,
    timer_wheel: Option<TimerWheel>,
  ) -> Self {
    Self {
      shared: Arc::new(StoreShared {
        provider,
        expiration,
        timer_wheel,
        deadlines: Mutex::new(HashMap::new()),
        invalidations: Mutex::new(HashMap::new()),
        bus: CacheBus::new(),
        metrics: StoreMetrics::default(),
        janitor: Mutex::new(None),
      }),
    }
  }

  /// Returns the entry for `key`, if any.
  pub fn get(&self, key: &str) -> Result<Option<CacheEntry<P, D>>, CacheError> {
    self.shared.provider.get(key)
  }

  /// Writes `data` under `key` and broadcasts `CacheEvent::Set`.
  ///
  /// The expiration timer for the key restarts on every call. The write itself
  /// is skipped when the current entry already holds the same data (by
  /// pointer) and equal params; the event is still broadcast.
  pub fn set(&self, key: &str, data: Arc<D>, params: Option<P>) -> Result<(), CacheError> {
    let current = self.shared.provider.get(key)?;
    let unchanged = current
      .as_ref()
      .map_or(false, |entry| Arc::ptr_eq(&entry.data, &data) && entry.params == params);

    if unchanged {
      self.shared.metrics.record_skipped_write();
    } else {
      let entry = CacheEntry::new(key, data, params, self.shared.expiration);
      self.shared.provider.set(key, entry)?;
      self.shared.metrics.record_write();
    }

    if let Some(ttl) = self.shared.expiration {
      self.restart_timer(key, ttl);
    }

    self.shared.bus.publish(key, CacheEvent::Set);
    Ok(())
  }

  /// Removes the entry for `key` and broadcasts `CacheEvent::Deleted`.
  pub fn delete(&self, key: &str) -> Result<(), CacheError> {
    self.shared.provider.delete(key)?;
    self.shared.deadlines.lock().remove(key);
    self.shared.record_invalidation(key);
    self.shared.metrics.record_delete();
    self.shared.bus.publish(key, CacheEvent::Deleted);
    Ok(())
  }

  /// Returns every key currently known to the provider.
  pub fn keys(&self) -> Result<Vec<String>, CacheError> {
    self.shared.provider.keys()
  }

  /// Applies `mutation` to every entry matched by `filter`, without fetching.
  ///
  /// Each touched key is written through [`set`](Self::set), so every request
  /// subscribed to it refreshes its visible data. The previous params of an
  /// entry are kept. Returns the number of keys written.
  pub fn mutate(&self, filter: impl Into<KeyFilter>, mutation: Mutation<D>) -> Result<usize, CacheError> {
    let keys = match filter.into() {
      KeyFilter::Keys(keys) => keys,
      KeyFilter::Predicate(predicate) => self
        .keys()?
        .into_iter()
        .filter(|key| predicate(key))
        .collect(),
    };

    for key in &keys {
      let current = self.get(key)?;
      let (prev, params) = match current {
        Some(entry) => (Some(entry.data), entry.params),
        None => (None, None),
      };
      let next = mutation.apply(prev.as_ref());
      self.set(key, next, params)?;
    }

    tracing::debug!(count = keys.len(), "applied global cache mutation");
    Ok(keys.len())
  }

  /// How many times `key` has been deleted or expired so far.
  pub(crate) fn invalidation_epoch(&self, key: &str) -> u64 {
    self.shared.invalidations.lock().get(key).copied().unwrap_or(0)
  }

  /// Subscribes to events for `key`.
  pub fn subscribe(&self, key: &str) -> CacheSubscription {
    self.shared.bus.subscribe(key)
  }

  /// Returns a snapshot of the store's counters.
  pub fn metrics(&self) -> StoreMetricsSnapshot {
    self.shared.metrics.snapshot()
  }

  /// The configured expiration, if any.
  pub fn expiration(&self) -> Option<Duration> {
    self.shared.expiration
  }

  fn restart_timer(&self, key: &str, ttl: Duration) {
    let deadline = Instant::now() + ttl;
    let already_scheduled = self
      .shared
      .deadlines
      .lock()
      .insert(key.to_owned(), deadline)
      .is_some();

    // An existing timer fires no later than the new deadline and re-schedules
    // itself, so one timer per key is enough.
    if !already_scheduled {
      if let Some(wheel) = &self.shared.timer_wheel {
        wheel.schedule(key, ttl);
      }
    }
  }

  fn start_janitor(&self, spawner: &TokioSpawner, tick_interval: Duration) {
    let janitor = Janitor::spawn(spawner, Arc::downgrade(&self.shared), tick_interval);
    *self.shared.janitor.lock() = Some(janitor);
  }
}

impl<P, D> Default for CacheStore<P, D>
where
  P: Clone + PartialEq + Send + Sync + 'static,
  D: Send + Sync + 'static,
{
  fn default() -> Self {
    Self::new()
  }
}

/// A builder for `CacheStore`.
pub struct CacheStoreBuilder<P, D> {
  provider: Option<Arc<dyn CacheProvider<P, D>>>,
  expiration: Option<Duration>,
  timer_wheel_tick_duration: Option<Duration>,
  timer_wheel_size: Option<usize>,
}

impl<P, D> fmt::Debug for CacheStoreBuilder<P, D> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CacheStoreBuilder")
      .field("has_provider", &self.provider.is_some())
      .field("expiration", &self.expiration)
      .field("timer_wheel_tick_duration", &self.timer_wheel_tick_duration)
      .field("timer_wheel_size", &self.timer_wheel_size)
      .finish_non_exhaustive()
  }
}

impl<P, D> CacheStoreBuilder<P, D> {
  pub fn new() -> Self {
    Self {
      provider: None,
      expiration: None,
      timer_wheel_tick_duration: None,
      timer_wheel_size: None,
    }
  }

  /// Sets the backing provider. Defaults to a [`MemoryProvider`].
  pub fn provider(mut self, provider: impl CacheProvider<P, D> + 'static) -> Self {
    self.provider = Some(Arc::new(provider));
    self
  }

  /// Uses an already shared provider.
  pub fn shared_provider(mut self, provider: Arc<dyn CacheProvider<P, D>>) -> Self {
    self.provider = Some(provider);
    self
  }

  /// Expires every entry `duration` after its last `set`.
  pub fn expiration(mut self, duration: Duration) -> Self {
    self.expiration = Some(duration);
    self
  }

  /// Disables expiration. This is the default.
  pub fn no_expiration(mut self) -> Self {
    self.expiration = None;
    self
  }

  /// Sets the timer wheel configuration using a preset.
  ///
  /// Later calls to `.timer_tick_duration()` or `.timer_wheel_size()`
  /// override the values set by this preset.
  pub fn timer_mode(mut self, mode: TimerWheelMode) -> Self {
    let (size, duration) = mode.dimensions();
    self.timer_wheel_size = Some(size);
    self.timer_wheel_tick_duration = Some(duration);
    self
  }

  /// Sets the granularity of expiration. Defaults to `1 second`. `build()`
  /// rejects a zero duration.
  pub fn timer_tick_duration(mut self, duration: Duration) -> Self {
    self.timer_wheel_tick_duration = Some(duration);
    self
  }

  /// Sets the number of slots in the timer wheel. Defaults to `60`.
  pub fn timer_wheel_size(mut self, size: usize) -> Self {
    self.timer_wheel_size = Some(size);
    self
  }
}

impl<P, D> Default for CacheStoreBuilder<P, D> {
  fn default() -> Self {
    Self::new()
  }
}

impl<P, D> CacheStoreBuilder<P, D>
where
  P: Clone + PartialEq + Send + Sync + 'static,
  D: Send + Sync + 'static,
{
  /// Builds the store.
  ///
  /// With expiration enabled this spawns the janitor and must be called from
  /// within a Tokio runtime.
  pub fn build(mut self) -> Result<CacheStore<P, D>, BuildError> {
    let provider = self
      .provider
      .take()
      .unwrap_or_else(|| Arc::new(MemoryProvider::new()));

    let Some(ttl) = self.expiration else {
      return Ok(CacheStore::from_parts(provider, None, None));
    };

    let wheel_size = self.timer_wheel_size.unwrap_or(60);
    if wheel_size == 0 {
      return Err(BuildError::ZeroTimerWheel);
    }
    let tick_duration = self
      .timer_wheel_tick_duration
      .unwrap_or(Duration::from_secs(1));
    if tick_duration.is_zero() {
      return Err(BuildError::ZeroTimerTick);
    }
    let spawner = TokioSpawner::current()?;

    let store = CacheStore::from_parts(
      provider,
      Some(ttl),
      Some(TimerWheel::new(wheel_size, tick_duration)),
    );
    store.start_janitor(&spawner, tick_duration);
    Ok(store)
  }
}
