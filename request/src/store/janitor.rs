use crate::runtime::TokioSpawner;
use crate::store::bus::CacheEvent;
use crate::store::StoreShared;

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// The background task that expires cache entries.
///
/// On each tick it advances the timer wheel, deletes every key whose deadline
/// has passed and broadcasts `CacheEvent::Expired` for it. Keys whose deadline
/// moved later (because they were set again) are put back on the wheel.
pub(crate) struct Janitor {
  handle: JoinHandle<()>,
}

impl Janitor {
  /// Spawns the janitor. It holds only a weak reference to the store and ends
  /// on its own once the store is dropped.
  pub(crate) fn spawn<P, D>(
    spawner: &TokioSpawner,
    shared: Weak<StoreShared<P, D>>,
    tick_interval: Duration,
  ) -> Self
  where
    P: Clone + PartialEq + Send + Sync + 'static,
    D: Send + Sync + 'static,
  {
    let handle = spawner.spawn(async move {
      let mut ticker = time::interval_at(Instant::now() + tick_interval, tick_interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Burst);

      loop {
        ticker.tick().await;
        let Some(shared) = shared.upgrade() else {
          break;
        };
        Self::cleanup(&shared);
      }
    });

    Self { handle }
  }

  fn cleanup<P, D>(shared: &Arc<StoreShared<P, D>>)
  where
    P: Clone + PartialEq + Send + Sync + 'static,
    D: Send + Sync + 'static,
  {
    let Some(wheel) = &shared.timer_wheel else {
      return;
    };

    let due = wheel.advance();
    if due.is_empty() {
      return;
    }

    let now = Instant::now();
    for key in due {
      let deadline = shared.deadlines.lock().get(&key).copied();
      match deadline {
        Some(deadline) if deadline <= now => {
          shared.deadlines.lock().remove(&key);
          if let Err(e) = shared.provider.delete(&key) {
            tracing::warn!(key = %key, error = %e, "failed to delete expired cache entry");
            continue;
          }
          tracing::debug!(key = %key, "cache entry expired");
          shared.record_invalidation(&key);
          shared.metrics.record_expiration();
          shared.bus.publish(&key, CacheEvent::Expired);
        }
        Some(deadline) => {
          // Set again since it was scheduled; look at it when the new deadline is due.
          wheel.schedule(&key, deadline - now);
        }
        // Deleted or re-set without expiration in the meantime.
        None => {}
      }
    }
  }

  pub(crate) fn stop(self) {
    self.handle.abort();
  }
}
