use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use crossbeam_utils::CachePadded;

/// Lock-free counters for one `Request`.
#[derive(Debug)]
pub(crate) struct Metrics {
  // --- Invocations ---
  pub(crate) invocations: CachePadded<AtomicU64>,
  pub(crate) revalidations: CachePadded<AtomicU64>,

  // --- Outcomes ---
  pub(crate) successes: CachePadded<AtomicU64>,
  pub(crate) failures: CachePadded<AtomicU64>,
  pub(crate) retries: CachePadded<AtomicU64>,
  pub(crate) superseded: CachePadded<AtomicU64>,
  pub(crate) rate_limited: CachePadded<AtomicU64>,
  pub(crate) slow_loads: CachePadded<AtomicU64>,

  created_at: Instant,
}

impl Default for Metrics {
  fn default() -> Self {
    Self {
      invocations: CachePadded::new(AtomicU64::new(0)),
      revalidations: CachePadded::new(AtomicU64::new(0)),
      successes: CachePadded::new(AtomicU64::new(0)),
      failures: CachePadded::new(AtomicU64::new(0)),
      retries: CachePadded::new(AtomicU64::new(0)),
      superseded: CachePadded::new(AtomicU64::new(0)),
      rate_limited: CachePadded::new(AtomicU64::new(0)),
      slow_loads: CachePadded::new(AtomicU64::new(0)),
      created_at: Instant::now(),
    }
  }
}

impl Metrics {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  #[inline]
  pub(crate) fn incr(counter: &CachePadded<AtomicU64>) {
    counter.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn snapshot(&self) -> MetricsSnapshot {
    MetricsSnapshot {
      invocations: self.invocations.load(Ordering::Relaxed),
      revalidations: self.revalidations.load(Ordering::Relaxed),
      successes: self.successes.load(Ordering::Relaxed),
      failures: self.failures.load(Ordering::Relaxed),
      retries: self.retries.load(Ordering::Relaxed),
      superseded: self.superseded.load(Ordering::Relaxed),
      rate_limited: self.rate_limited.load(Ordering::Relaxed),
      slow_loads: self.slow_loads.load(Ordering::Relaxed),
      uptime_secs: self.created_at.elapsed().as_secs(),
    }
  }
}

/// A point-in-time snapshot of a request's counters.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
  /// Call chains started, from any trigger.
  pub invocations: u64,
  /// Call chains started by a background trigger (interval, focus,
  /// reconnect, dependency change, cache invalidation).
  pub revalidations: u64,
  /// Chains whose result was committed.
  pub successes: u64,
  /// Chains that exhausted their retries while still current.
  pub failures: u64,
  /// Retry attempts made after a failed attempt.
  pub retries: u64,
  /// Chains whose result was dropped because a newer call won.
  pub superseded: u64,
  /// Manual calls coalesced away by throttle/debounce.
  pub rate_limited: u64,
  /// Chains that outlived `loading_timeout`.
  pub slow_loads: u64,
  /// The number of seconds the request has existed.
  pub uptime_secs: u64,
}

impl fmt::Debug for MetricsSnapshot {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("MetricsSnapshot")
      .field("invocations", &self.invocations)
      .field("revalidations", &self.revalidations)
      .field("successes", &self.successes)
      .field("failures", &self.failures)
      .field("retries", &self.retries)
      .field("superseded", &self.superseded)
      .field("rate_limited", &self.rate_limited)
      .field("slow_loads", &self.slow_loads)
      .field("uptime_secs", &self.uptime_secs)
      .finish()
  }
}

/// Lock-free counters for one `CacheStore`.
#[derive(Debug, Default)]
pub(crate) struct StoreMetrics {
  writes: CachePadded<AtomicU64>,
  skipped_writes: CachePadded<AtomicU64>,
  deletes: CachePadded<AtomicU64>,
  expirations: CachePadded<AtomicU64>,
}

impl StoreMetrics {
  pub(crate) fn record_write(&self) {
    self.writes.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_skipped_write(&self) {
    self.skipped_writes.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_delete(&self) {
    self.deletes.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn record_expiration(&self) {
    self.expirations.fetch_add(1, Ordering::Relaxed);
  }

  pub(crate) fn snapshot(&self) -> StoreMetricsSnapshot {
    StoreMetricsSnapshot {
      writes: self.writes.load(Ordering::Relaxed),
      skipped_writes: self.skipped_writes.load(Ordering::Relaxed),
      deletes: self.deletes.load(Ordering::Relaxed),
      expirations: self.expirations.load(Ordering::Relaxed),
    }
  }
}

/// A point-in-time snapshot of a cache store's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreMetricsSnapshot {
  /// Entries written by `set` or `mutate`.
  pub writes: u64,
  /// `set` calls skipped because data and params were unchanged.
  pub skipped_writes: u64,
  /// Explicit invalidations.
  pub deletes: u64,
  /// Entries removed by their expiration timer.
  pub expirations: u64,
}
