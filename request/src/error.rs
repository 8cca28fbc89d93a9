use std::sync::Arc;

use thiserror::Error;

/// Errors that can occur when building a `CacheStore` or a `Request`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
  /// A component that spawns background tasks was built outside of a Tokio
  /// runtime context.
  #[error("a tokio runtime is required to build this component")]
  RuntimeRequired,
  /// The request is not `manual` but has no parameters to run with: neither
  /// `initial_params` nor a cached entry carrying params was available.
  #[error("an automatic request needs initial params or a cached entry with params")]
  MissingInitialParams,
  /// The expiration timer wheel was configured with zero slots.
  #[error("timer wheel size cannot be zero")]
  ZeroTimerWheel,
  /// The expiration timer wheel was configured with a zero tick duration.
  #[error("timer tick duration cannot be zero")]
  ZeroTimerTick,
}

/// Errors reported by a cache provider.
///
/// These propagate synchronously to whoever touched the cache: the caller of
/// `mutate`, `CacheStore::set`, or a manual `run_async`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
  /// The backing store could not be reached.
  #[error("cache provider unavailable: {0}")]
  Unavailable(String),
  /// The backing store rejected the operation.
  #[error("cache provider error: {0}")]
  Provider(String),
}

/// The error returned to the direct caller of `Request::run_async`.
///
/// Background triggers never surface this type; their failures land in the
/// request's `error` state and the callback channel.
#[derive(Debug, Error)]
pub enum RequestError<E> {
  /// The operation failed on every attempt. Holds the last failure, which is
  /// also the request's visible `error`.
  #[error("request failed: {0}")]
  Fetch(Arc<E>),
  /// A newer invocation, or `cancel()`, overtook this call. Its result was
  /// dropped.
  #[error("request was superseded by a newer invocation")]
  Superseded,
  /// The call was coalesced away by the throttle/debounce window and never ran.
  #[error("request was dropped by rate control")]
  RateLimited,
  /// The cache provider failed while committing the result.
  #[error(transparent)]
  Provider(#[from] CacheError),
  /// `refresh` was called before any params were known.
  #[error("request has no params to refresh with")]
  MissingParams,
  /// The request was torn down before the call could run.
  #[error("request was torn down")]
  TornDown,
  /// The call chain ended without reporting an outcome, for example because
  /// the operation panicked.
  #[error("request chain ended without an outcome")]
  Aborted,
}

impl<E> RequestError<E> {
  /// Returns the fetch error, if this is a `Fetch` failure.
  pub fn fetch_error(&self) -> Option<&Arc<E>> {
    match self {
      RequestError::Fetch(e) => Some(e),
      _ => None,
    }
  }

  /// Returns `true` if the call's result was dropped because a newer call won.
  pub fn is_superseded(&self) -> bool {
    matches!(self, RequestError::Superseded)
  }
}
