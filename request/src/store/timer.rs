use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Preset configurations for the store's expiration timer wheel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerWheelMode {
  /// A general-purpose configuration.
  ///
  /// - Granularity: 1 second
  /// - Wheel Size: 60 slots (1-minute cycle)
  Default,

  /// For entries that live for milliseconds to a few seconds.
  ///
  /// - Granularity: 10 milliseconds
  /// - Wheel Size: 100 slots (1-second cycle)
  HighPrecisionShortLived,

  /// For entries that live for many minutes or hours.
  ///
  /// - Granularity: 30 seconds
  /// - Wheel Size: 120 slots (1-hour cycle)
  LowPrecisionLongLived,
}

impl TimerWheelMode {
  /// Returns `(wheel_size, tick_duration)` for this preset.
  pub(crate) fn dimensions(self) -> (usize, Duration) {
    match self {
      TimerWheelMode::Default => (60, Duration::from_secs(1)),
      TimerWheelMode::HighPrecisionShortLived => (100, Duration::from_millis(10)),
      TimerWheelMode::LowPrecisionLongLived => (120, Duration::from_secs(30)),
    }
  }
}

// A pending expiration in one of the wheel's slots.
struct Timer {
  laps: usize,
  key: String,
}

/// A hashed timer wheel holding cache keys that are due to expire.
///
/// The wheel only says *when to look* at a key. Whether the key is actually
/// expired is decided by the janitor against the key's current deadline, so a
/// key that was re-set simply gets looked at early and re-scheduled.
pub(crate) struct TimerWheel {
  wheel: Vec<Mutex<VecDeque<Timer>>>,
  current_tick: AtomicUsize,
  tick_duration: Duration,
}

impl TimerWheel {
  pub(crate) fn new(wheel_size: usize, tick_duration: Duration) -> Self {
    let mut wheel = Vec::with_capacity(wheel_size);
    for _ in 0..wheel_size {
      wheel.push(Mutex::new(VecDeque::new()));
    }
    Self {
      wheel,
      current_tick: AtomicUsize::new(0),
      tick_duration,
    }
  }

  /// Schedules `key` to be looked at once `duration` has elapsed.
  ///
  /// The tick count is rounded up so a key is never looked at before its
  /// deadline has had a chance to pass.
  pub(crate) fn schedule(&self, key: &str, duration: Duration) {
    let ticks = (duration.as_secs_f64() / self.tick_duration.as_secs_f64()).ceil() as usize;
    let ticks = ticks.max(1);
    let current_tick = self.current_tick.load(Ordering::Relaxed);
    let laps = (ticks - 1) / self.wheel.len();
    let slot = (current_tick + ticks - 1) % self.wheel.len();

    self.wheel[slot].lock().push_back(Timer {
      laps,
      key: key.to_owned(),
    });
  }

  /// Processes the current slot and moves to the next one, returning the keys
  /// whose timers ran out.
  pub(crate) fn advance(&self) -> Vec<String> {
    let tick_to_process = self.current_tick.fetch_add(1, Ordering::Relaxed);
    let slot = tick_to_process % self.wheel.len();

    let mut current_bucket = self.wheel[slot].lock();

    let mut expired = Vec::new();
    let mut still_running = VecDeque::with_capacity(current_bucket.len());

    while let Some(mut timer) = current_bucket.pop_front() {
      if timer.laps > 0 {
        timer.laps -= 1;
        still_running.push_back(timer);
      } else {
        expired.push(timer.key);
      }
    }

    *current_bucket = still_running;
    expired
  }

  /// Returns the number of timers currently in the wheel.
  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.wheel.iter().map(|bucket| bucket.lock().len()).sum()
  }
}
