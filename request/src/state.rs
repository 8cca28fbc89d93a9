use std::fmt;
use std::sync::Arc;

/// The visible state of a `Request`.
///
/// Published through a `tokio::sync::watch` channel: observers get the latest
/// value and a change notification, never a backlog.
pub struct RequestState<P, D, E> {
  /// The last committed data. Kept through failures, so a failed refresh
  /// shows stale data next to an error.
  pub data: Option<Arc<D>>,
  /// The last error of a chain that exhausted its retries. Cleared by the
  /// next success.
  pub error: Option<Arc<E>>,
  pub loading: bool,
  /// The current chain has outlived `loading_timeout`.
  pub loading_slow: bool,
  /// The params of the most recent invocation.
  pub params: Option<P>,
  /// Whether background revalidation is enabled.
  pub active: bool,
}

impl<P, D, E> RequestState<P, D, E> {
  /// Loading with nothing to show yet.
  pub fn initializing(&self) -> bool {
    self.data.is_none() && self.loading
  }

  /// Loading while showing earlier data.
  pub fn refreshing(&self) -> bool {
    self.data.is_some() && self.loading
  }
}

impl<P: Clone, D, E> Clone for RequestState<P, D, E> {
  fn clone(&self) -> Self {
    Self {
      data: self.data.clone(),
      error: self.error.clone(),
      loading: self.loading,
      loading_slow: self.loading_slow,
      params: self.params.clone(),
      active: self.active,
    }
  }
}

impl<P, D, E> fmt::Debug for RequestState<P, D, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RequestState")
      .field("has_data", &self.data.is_some())
      .field("has_error", &self.error.is_some())
      .field("loading", &self.loading)
      .field("loading_slow", &self.loading_slow)
      .field("has_params", &self.params.is_some())
      .field("active", &self.active)
      .finish()
  }
}
