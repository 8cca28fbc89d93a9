use crate::runtime::TokioSpawner;

use std::time::Duration;

use tokio::task::JoinHandle;

/// Flags a call chain that runs longer than `loading_timeout`.
///
/// The detector only owns the timer. Setting and clearing the visible
/// `loading_slow` flag goes through the version guard in the request, so a
/// superseded chain can neither raise nor clear it.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct SlowLoadingDetector {
  timeout: Duration,
}

impl SlowLoadingDetector {
  pub(crate) fn new(timeout: Duration) -> Self {
    Self { timeout }
  }

  pub(crate) fn is_enabled(&self) -> bool {
    !self.timeout.is_zero()
  }

  /// Starts the timer for a chain that is about to run. `on_slow` runs if the
  /// timer fires before the returned `SlowTimer` is dropped.
  ///
  /// Returns `None` when the detector is disabled.
  pub(crate) fn arm<F>(&self, spawner: &TokioSpawner, on_slow: F) -> Option<SlowTimer>
  where
    F: FnOnce() + Send + 'static,
  {
    if !self.is_enabled() {
      return None;
    }
    let timeout = self.timeout;
    let handle = spawner.spawn(async move {
      tokio::time::sleep(timeout).await;
      on_slow();
    });
    Some(SlowTimer { handle })
  }
}

/// A running slow-loading timer. Dropping it cancels the timer.
#[derive(Debug)]
pub(crate) struct SlowTimer {
  handle: JoinHandle<()>,
}

impl Drop for SlowTimer {
  fn drop(&mut self) {
    self.handle.abort();
  }
}
