use std::future::Future;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::error::BuildError;

/// Spawns the engine's background work (fetch chains, timers, listeners)
/// onto the Tokio runtime that was current when the component was built.
///
/// Holding the handle lets `run()` be called from any thread, including
/// threads outside the runtime.
#[derive(Debug, Clone)]
pub(crate) struct TokioSpawner(Handle);

impl TokioSpawner {
  /// Captures the current Tokio runtime.
  pub(crate) fn current() -> Result<Self, BuildError> {
    Handle::try_current()
      .map(Self)
      .map_err(|_| BuildError::RuntimeRequired)
  }

  pub(crate) fn spawn<F>(&self, future: F) -> JoinHandle<()>
  where
    F: Future<Output = ()> + Send + 'static,
  {
    self.0.spawn(future)
  }
}
