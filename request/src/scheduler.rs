//! Background revalidation triggers.
//!
//! The scheduler owns the tasks that decide *when* to revalidate: a fixed
//! interval, focus regained, connectivity regained, and dependency changes.
//! What a revalidation does, and whether the gate lets it through, is up to
//! the [`Revalidate`] target. Tasks hold the target weakly and exit once it is
//! gone.

use crate::platform::{Platform, PlatformEvent};
use crate::runtime::TokioSpawner;

use std::fmt;
use std::sync::Weak;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// What started a call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Trigger {
  /// The automatic first run of a non-manual request.
  Mount,
  Manual,
  Interval,
  Focus,
  Reconnect,
  Dependency,
  /// The shared cache entry expired or was deleted.
  Invalidated,
}

impl Trigger {
  pub(crate) fn is_background(self) -> bool {
    !matches!(self, Trigger::Mount | Trigger::Manual)
  }
}

impl fmt::Display for Trigger {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Trigger::Mount => f.write_str("mount"),
      Trigger::Manual => f.write_str("manual"),
      Trigger::Interval => f.write_str("interval"),
      Trigger::Focus => f.write_str("focus"),
      Trigger::Reconnect => f.write_str("reconnect"),
      Trigger::Dependency => f.write_str("dependency"),
      Trigger::Invalidated => f.write_str("cache invalidation"),
    }
  }
}

/// The trigger flags in effect right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TriggerRegistration {
  pub(crate) refresh_on_focus: bool,
  pub(crate) refresh_on_focus_throttle_wait: Duration,
  pub(crate) refresh_on_reconnect: bool,
  pub(crate) refresh_when_hidden: bool,
  pub(crate) refresh_when_offline: bool,
}

/// The receiving end of the scheduler's triggers.
pub(crate) trait Revalidate: Send + Sync + 'static {
  /// Starts a background chain with the latest params, unless the gate is
  /// inactive.
  fn revalidate(&self, trigger: Trigger);

  /// Reads the latest trigger flags. Called on every event, so
  /// reconfiguration takes effect without restarting listeners.
  fn registration(&self) -> TriggerRegistration;
}

/// A dependency watch, erased over its value type until the scheduler
/// starts it.
pub(crate) type DependencyWatcher = Box<dyn FnOnce(Weak<dyn Revalidate>) -> BoxFuture<'static, ()> + Send>;

/// Watches `rx` and revalidates whenever its value changes. The value present
/// at registration does not count as a change.
pub(crate) fn dependency_watcher<T>(mut rx: watch::Receiver<T>) -> DependencyWatcher
where
  T: Send + Sync + 'static,
{
  Box::new(move |target: Weak<dyn Revalidate>| -> BoxFuture<'static, ()> {
    Box::pin(async move {
      rx.borrow_and_update();
      while rx.changed().await.is_ok() {
        rx.borrow_and_update();
        let Some(target) = target.upgrade() else {
          return;
        };
        target.revalidate(Trigger::Dependency);
      }
    })
  })
}

pub(crate) struct RevalidationScheduler {
  spawner: TokioSpawner,
  platform: Platform,
  target: Weak<dyn Revalidate>,
  every: Duration,
  interval: Option<JoinHandle<()>>,
  listeners: Vec<JoinHandle<()>>,
}

impl RevalidationScheduler {
  pub(crate) fn new(spawner: TokioSpawner, platform: Platform, target: Weak<dyn Revalidate>) -> Self {
    Self {
      spawner,
      platform,
      target,
      every: Duration::ZERO,
      interval: None,
      listeners: Vec::new(),
    }
  }

  /// Starts the focus and reconnect listener.
  pub(crate) fn listen_platform(&mut self) {
    let events = self.platform.subscribe();
    let target = self.target.clone();
    let handle = self.spawner.spawn(platform_listener(events, target));
    self.listeners.push(handle);
  }

  pub(crate) fn watch_dependency(&mut self, watcher: DependencyWatcher) {
    let handle = self.spawner.spawn(watcher(self.target.clone()));
    self.listeners.push(handle);
  }

  /// Sets the interval period. `Duration::ZERO` disables the interval. A
  /// running interval restarts with the new period; a stopped one stays
  /// stopped.
  pub(crate) fn set_interval(&mut self, every: Duration) {
    if every == self.every {
      return;
    }
    self.every = every;
    if self.interval.is_some() {
      self.stop_interval();
      self.start_interval();
    }
  }

  /// Starts the interval with the configured period. The first tick is one
  /// full period from now.
  pub(crate) fn start_interval(&mut self) {
    if self.every.is_zero() || self.interval.is_some() {
      return;
    }
    let every = self.every;
    let platform = self.platform.clone();
    let target = self.target.clone();
    let handle = self.spawner.spawn(async move {
      let mut ticker = tokio::time::interval_at(Instant::now() + every, every);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let Some(target) = target.upgrade() else {
          return;
        };
        let registration = target.registration();
        let visible = platform.is_visible() || registration.refresh_when_hidden;
        let online = platform.is_online() || registration.refresh_when_offline;
        if visible && online {
          target.revalidate(Trigger::Interval);
        } else {
          tracing::trace!(visible, online, "interval tick skipped by platform policy");
        }
      }
    });
    tracing::debug!(every_ms = every.as_millis() as u64, "revalidation interval started");
    self.interval = Some(handle);
  }

  pub(crate) fn stop_interval(&mut self) {
    if let Some(handle) = self.interval.take() {
      handle.abort();
      tracing::debug!("revalidation interval stopped");
    }
  }

  /// Stops every task.
  pub(crate) fn shutdown(&mut self) {
    self.stop_interval();
    for handle in self.listeners.drain(..) {
      handle.abort();
    }
  }
}

impl Drop for RevalidationScheduler {
  fn drop(&mut self) {
    self.shutdown();
  }
}

impl fmt::Debug for RevalidationScheduler {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RevalidationScheduler")
      .field("every", &self.every)
      .field("interval_running", &self.interval.is_some())
      .field("listeners", &self.listeners.len())
      .finish()
  }
}

async fn platform_listener(mut events: broadcast::Receiver<PlatformEvent>, target: Weak<dyn Revalidate>) {
  let mut last_focus_refresh: Option<Instant> = None;
  loop {
    let event = match events.recv().await {
      Ok(event) => event,
      Err(broadcast::error::RecvError::Lagged(skipped)) => {
        tracing::trace!(skipped, "platform listener lagged");
        continue;
      }
      Err(broadcast::error::RecvError::Closed) => return,
    };
    let Some(target) = target.upgrade() else {
      return;
    };
    let registration = target.registration();

    match event {
      PlatformEvent::FocusGained | PlatformEvent::Visible if registration.refresh_on_focus => {
        // Leading edge: the first regain fires, later ones inside the wait
        // are ignored.
        let now = Instant::now();
        let throttled = last_focus_refresh
          .is_some_and(|last| now.duration_since(last) < registration.refresh_on_focus_throttle_wait);
        if throttled {
          tracing::trace!(event = %event, "focus refresh throttled");
        } else {
          last_focus_refresh = Some(now);
          target.revalidate(Trigger::Focus);
        }
      }
      PlatformEvent::Online if registration.refresh_on_reconnect => {
        target.revalidate(Trigger::Reconnect);
      }
      _ => {}
    }
  }
}
