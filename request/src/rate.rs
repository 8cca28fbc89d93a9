//! Throttle and debounce for the manual entry point.
//!
//! A [`RateGate`] implements one window with leading/trailing edge
//! semantics. [`RateControl`] chains an optional debounce stage into an
//! optional throttle stage. Background triggers never pass through here.
//!
//! Items that lose their slot (a newer call replaced them while pending, or
//! the window closed on a leading-only gate) are dropped. Callers that need
//! to observe that carry a `oneshot::Sender` in the item: dropping it closes
//! the channel.

use crate::runtime::TokioSpawner;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Edge options for one rate-control window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateOptions {
  /// The window length.
  pub wait: Duration,
  /// Fire the first call of a window immediately.
  pub leading: bool,
  /// Fire the last pending call when the window closes.
  pub trailing: bool,
  /// The longest a pending call may be delayed by calls arriving after it.
  /// `None` lets every call push the deadline out by `wait`.
  pub max_wait: Option<Duration>,
}

impl RateOptions {
  /// Trailing-edge only: fires once calls stop arriving for `wait`.
  pub fn debounce(wait: Duration) -> Self {
    Self {
      wait,
      leading: false,
      trailing: true,
      max_wait: None,
    }
  }

  /// Fires at most once per `wait`, on both edges.
  pub fn throttle(wait: Duration) -> Self {
    Self {
      wait,
      leading: true,
      trailing: true,
      max_wait: Some(wait),
    }
  }

  pub fn leading(mut self, leading: bool) -> Self {
    self.leading = leading;
    self
  }

  pub fn trailing(mut self, trailing: bool) -> Self {
    self.trailing = trailing;
    self
  }

  pub fn max_wait(mut self, max_wait: Duration) -> Self {
    self.max_wait = Some(max_wait);
    self
  }
}

/// A bare duration means a trailing-edge debounce of that length.
impl From<Duration> for RateOptions {
  fn from(wait: Duration) -> Self {
    RateOptions::debounce(wait)
  }
}

pub(crate) type Sink<T> = Arc<dyn Fn(T) + Send + Sync>;

struct Window<T> {
  // Bumped whenever a window opens or is cancelled. A timer task whose
  // generation is stale exits without touching anything.
  generation: u64,
  open: bool,
  started_at: Instant,
  deadline: Instant,
  pending: Option<T>,
}

struct RateGateShared<T> {
  options: RateOptions,
  window: Mutex<Window<T>>,
  sink: Sink<T>,
  spawner: TokioSpawner,
}

/// One throttle/debounce window in front of a sink.
pub(crate) struct RateGate<T> {
  shared: Arc<RateGateShared<T>>,
}

impl<T> Clone for RateGate<T> {
  fn clone(&self) -> Self {
    Self {
      shared: Arc::clone(&self.shared),
    }
  }
}

impl<T: Send + 'static> RateGate<T> {
  pub(crate) fn new(options: RateOptions, spawner: TokioSpawner, sink: Sink<T>) -> Self {
    let now = Instant::now();
    Self {
      shared: Arc::new(RateGateShared {
        options,
        window: Mutex::new(Window {
          generation: 0,
          open: false,
          started_at: now,
          deadline: now,
          pending: None,
        }),
        sink,
        spawner,
      }),
    }
  }

  pub(crate) fn submit(&self, item: T) {
    let options = self.shared.options;
    let now = Instant::now();

    let mut window = self.shared.window.lock();
    if !window.open {
      window.generation += 1;
      window.open = true;
      window.started_at = now;
      window.deadline = now + options.wait;
      let generation = window.generation;

      let fire_now = if options.leading {
        Some(item)
      } else {
        window.pending = Some(item);
        None
      };
      drop(window);

      self.spawn_timer(generation);
      if let Some(item) = fire_now {
        (self.shared.sink)(item);
      }
      return;
    }

    // Replacing the pending item drops the previous one.
    window.pending = Some(item);
    let mut deadline = now + options.wait;
    if let Some(max_wait) = options.max_wait {
      deadline = deadline.min(window.started_at + max_wait);
    }
    window.deadline = deadline;
  }

  /// Closes the current window and drops whatever is pending.
  pub(crate) fn cancel(&self) {
    let mut window = self.shared.window.lock();
    window.generation += 1;
    window.open = false;
    window.pending = None;
  }

  fn spawn_timer(&self, generation: u64) {
    let shared = Arc::downgrade(&self.shared);
    self.shared.spawner.spawn(async move {
      loop {
        let deadline = {
          let Some(shared) = shared.upgrade() else {
            return;
          };
          let window = shared.window.lock();
          if window.generation != generation || !window.open {
            return;
          }
          window.deadline
        };

        tokio::time::sleep_until(deadline).await;

        let Some(shared) = shared.upgrade() else {
          return;
        };
        let mut window = shared.window.lock();
        if window.generation != generation || !window.open {
          return;
        }
        if Instant::now() < window.deadline {
          continue;
        }

        let pending = window.pending.take();
        match pending {
          Some(item) if shared.options.trailing => {
            // Calls arriving right after a trailing fire still wait a full
            // window.
            let now = Instant::now();
            window.started_at = now;
            window.deadline = now + shared.options.wait;
            drop(window);
            (shared.sink)(item);
          }
          _ => {
            window.open = false;
            return;
          }
        }
      }
    });
  }
}

impl<T> fmt::Debug for RateGate<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RateGate")
      .field("options", &self.shared.options)
      .finish_non_exhaustive()
  }
}

/// Debounce, then throttle, then the sink. Either stage may be absent.
pub(crate) struct RateControl<T> {
  entry: Entry<T>,
  stages: Vec<RateGate<T>>,
}

enum Entry<T> {
  Direct(Sink<T>),
  Gate(RateGate<T>),
}

impl<T: Send + 'static> RateControl<T> {
  pub(crate) fn new(
    debounce: Option<RateOptions>,
    throttle: Option<RateOptions>,
    spawner: &TokioSpawner,
    sink: Sink<T>,
  ) -> Self {
    let mut stages = Vec::new();
    let mut next = sink;

    for options in [throttle, debounce].into_iter().flatten() {
      let gate = RateGate::new(options, spawner.clone(), next);
      let downstream = gate.clone();
      next = Arc::new(move |item| downstream.submit(item));
      stages.push(gate);
    }

    let entry = match stages.last() {
      Some(first) => Entry::Gate(first.clone()),
      None => Entry::Direct(next),
    };
    Self { entry, stages }
  }

  pub(crate) fn submit(&self, item: T) {
    match &self.entry {
      Entry::Direct(sink) => sink(item),
      Entry::Gate(gate) => gate.submit(item),
    }
  }

  pub(crate) fn cancel(&self) {
    for stage in &self.stages {
      stage.cancel();
    }
  }
}

impl<T> fmt::Debug for RateControl<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RateControl")
      .field("stages", &self.stages)
      .finish()
  }
}
