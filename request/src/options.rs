//! The options snapshot a `Request` reads on every continuation.

use crate::rate::RateOptions;
use crate::retry::RetryInterval;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub(crate) const DEFAULT_FOCUS_THROTTLE_WAIT: Duration = Duration::from_secs(5);

pub type BeforeCallback<P> = Arc<dyn Fn(&P) + Send + Sync>;
pub type SuccessCallback<P, D> = Arc<dyn Fn(&Arc<D>, &P) + Send + Sync>;
pub type ErrorCallback<P, E> = Arc<dyn Fn(&E, &P) + Send + Sync>;
pub type ErrorRetryCallback<E> = Arc<dyn Fn(&E, u32) + Send + Sync>;
pub type RetryFailedCallback<E> = Arc<dyn Fn(&E) + Send + Sync>;
pub type FinallyCallback<P, D, E> = Arc<dyn Fn(&P, Option<&Arc<D>>, Option<&Arc<E>>) + Send + Sync>;
pub type LoadingSlowCallback = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle callbacks. Each runs on whichever task settles the event, outside
/// of any internal lock, so a callback may call back into the request.
pub struct Callbacks<P, D, E> {
  /// A chain is about to start. Receives its params.
  pub on_before: Option<BeforeCallback<P>>,
  /// A current chain succeeded and its data was committed.
  pub on_success: Option<SuccessCallback<P, D>>,
  /// An attempt of a current chain failed.
  pub on_error: Option<ErrorCallback<P, E>>,
  /// A retry is about to start. Receives the 1-based retry number.
  pub on_error_retry: Option<ErrorRetryCallback<E>>,
  /// Every attempt of a current chain failed.
  pub on_retry_failed: Option<RetryFailedCallback<E>>,
  /// A current chain settled, either way.
  pub on_finally: Option<FinallyCallback<P, D, E>>,
  /// A current chain outlived `loading_timeout`.
  pub on_loading_slow: Option<LoadingSlowCallback>,
}

impl<P, D, E> Default for Callbacks<P, D, E> {
  fn default() -> Self {
    Self {
      on_before: None,
      on_success: None,
      on_error: None,
      on_error_retry: None,
      on_retry_failed: None,
      on_finally: None,
      on_loading_slow: None,
    }
  }
}

impl<P, D, E> Clone for Callbacks<P, D, E> {
  fn clone(&self) -> Self {
    Self {
      on_before: self.on_before.clone(),
      on_success: self.on_success.clone(),
      on_error: self.on_error.clone(),
      on_error_retry: self.on_error_retry.clone(),
      on_retry_failed: self.on_retry_failed.clone(),
      on_finally: self.on_finally.clone(),
      on_loading_slow: self.on_loading_slow.clone(),
    }
  }
}

impl<P, D, E> fmt::Debug for Callbacks<P, D, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Callbacks")
      .field("on_before", &self.on_before.is_some())
      .field("on_success", &self.on_success.is_some())
      .field("on_error", &self.on_error.is_some())
      .field("on_error_retry", &self.on_error_retry.is_some())
      .field("on_retry_failed", &self.on_retry_failed.is_some())
      .field("on_finally", &self.on_finally.is_some())
      .field("on_loading_slow", &self.on_loading_slow.is_some())
      .finish()
  }
}

/// How a request derives its cache key.
pub enum CacheKey<P> {
  Static(String),
  /// Computed from each invocation's params. The request follows the key as
  /// it changes.
  Dynamic(Arc<dyn Fn(&P) -> String + Send + Sync>),
}

impl<P> CacheKey<P> {
  /// Resolves the key for `params`. A dynamic key has no value without params.
  pub fn resolve(&self, params: Option<&P>) -> Option<String> {
    match self {
      CacheKey::Static(key) => Some(key.clone()),
      CacheKey::Dynamic(f) => params.map(|params| f(params)),
    }
  }
}

impl<P> Clone for CacheKey<P> {
  fn clone(&self) -> Self {
    match self {
      CacheKey::Static(key) => CacheKey::Static(key.clone()),
      CacheKey::Dynamic(f) => CacheKey::Dynamic(Arc::clone(f)),
    }
  }
}

impl<P> fmt::Debug for CacheKey<P> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      CacheKey::Static(key) => f.debug_tuple("Static").field(key).finish(),
      CacheKey::Dynamic(_) => f.write_str("Dynamic(..)"),
    }
  }
}

/// Everything about a request that `Request::reconfigure` can change.
///
/// Held behind an `Arc` and swapped whole. Continuations (retry hooks, the
/// slow timer, background triggers) always read the latest snapshot rather
/// than the one current when their chain started.
pub struct RequestOptions<P, D, E> {
  /// Skip the automatic first run. Defaults to `false`.
  pub manual: bool,
  pub throttle: Option<RateOptions>,
  pub debounce: Option<RateOptions>,
  pub refresh_on_focus: bool,
  /// Minimum spacing between focus-triggered refreshes. Defaults to 5s.
  pub refresh_on_focus_throttle_wait: Duration,
  pub refresh_on_reconnect: bool,
  /// `Duration::ZERO` disables the interval. This is the default.
  pub refresh_interval: Duration,
  pub refresh_when_hidden: bool,
  pub refresh_when_offline: bool,
  /// Retries after the first failure. Defaults to `0`.
  pub error_retry_count: u32,
  pub error_retry_interval: RetryInterval,
  /// `Duration::ZERO` disables slow-loading detection. This is the default.
  pub loading_timeout: Duration,
  pub callbacks: Callbacks<P, D, E>,
}

impl<P, D, E> Default for RequestOptions<P, D, E> {
  fn default() -> Self {
    Self {
      manual: false,
      throttle: None,
      debounce: None,
      refresh_on_focus: false,
      refresh_on_focus_throttle_wait: DEFAULT_FOCUS_THROTTLE_WAIT,
      refresh_on_reconnect: false,
      refresh_interval: Duration::ZERO,
      refresh_when_hidden: false,
      refresh_when_offline: false,
      error_retry_count: 0,
      error_retry_interval: RetryInterval::default(),
      loading_timeout: Duration::ZERO,
      callbacks: Callbacks::default(),
    }
  }
}

impl<P, D, E> Clone for RequestOptions<P, D, E> {
  fn clone(&self) -> Self {
    Self {
      manual: self.manual,
      throttle: self.throttle,
      debounce: self.debounce,
      refresh_on_focus: self.refresh_on_focus,
      refresh_on_focus_throttle_wait: self.refresh_on_focus_throttle_wait,
      refresh_on_reconnect: self.refresh_on_reconnect,
      refresh_interval: self.refresh_interval,
      refresh_when_hidden: self.refresh_when_hidden,
      refresh_when_offline: self.refresh_when_offline,
      error_retry_count: self.error_retry_count,
      error_retry_interval: self.error_retry_interval.clone(),
      loading_timeout: self.loading_timeout,
      callbacks: self.callbacks.clone(),
    }
  }
}

impl<P, D, E> fmt::Debug for RequestOptions<P, D, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RequestOptions")
      .field("manual", &self.manual)
      .field("throttle", &self.throttle)
      .field("debounce", &self.debounce)
      .field("refresh_on_focus", &self.refresh_on_focus)
      .field("refresh_on_focus_throttle_wait", &self.refresh_on_focus_throttle_wait)
      .field("refresh_on_reconnect", &self.refresh_on_reconnect)
      .field("refresh_interval", &self.refresh_interval)
      .field("refresh_when_hidden", &self.refresh_when_hidden)
      .field("refresh_when_offline", &self.refresh_when_offline)
      .field("error_retry_count", &self.error_retry_count)
      .field("error_retry_interval", &self.error_retry_interval)
      .field("loading_timeout", &self.loading_timeout)
      .field("callbacks", &self.callbacks)
      .finish()
  }
}
