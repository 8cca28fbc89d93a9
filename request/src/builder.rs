use crate::error::BuildError;
use crate::gate::PausableGate;
use crate::guard::VersionGuard;
use crate::metrics::Metrics;
use crate::options::{CacheKey, RequestOptions};
use crate::platform::Platform;
use crate::rate::RateOptions;
use crate::request::{Request, RequestInner};
use crate::retry::{RetryInterval, Service};
use crate::runtime::TokioSpawner;
use crate::scheduler::{self, DependencyWatcher, Revalidate, RevalidationScheduler, Trigger};
use crate::state::RequestState;
use crate::store::CacheStore;

use core::fmt;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::watch;

/// A builder for `Request`.
pub struct RequestBuilder<P, D, E> {
  service: Service<P, D, E>,
  options: RequestOptions<P, D, E>,
  initial_params: Option<P>,
  initial_data: Option<Arc<D>>,
  cache_key: Option<CacheKey<P>>,
  store: Option<CacheStore<P, D>>,
  platform: Option<Platform>,
  dependencies: Vec<DependencyWatcher>,
}

// Manual Debug implementation for RequestBuilder.
impl<P, D, E> fmt::Debug for RequestBuilder<P, D, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RequestBuilder")
      .field("options", &self.options)
      .field("has_initial_params", &self.initial_params.is_some())
      .field("has_initial_data", &self.initial_data.is_some())
      .field("cache_key", &self.cache_key)
      .field("has_store", &self.store.is_some())
      .field("dependencies", &self.dependencies.len())
      .finish_non_exhaustive()
  }
}

impl<P, D, E> RequestBuilder<P, D, E>
where
  P: Clone + PartialEq + Send + Sync + 'static,
  D: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  pub fn new<F, Fut>(service: F) -> Self
  where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<D, E>> + Send + 'static,
  {
    let service: Service<P, D, E> = Arc::new(move |params| service(params).boxed());
    Self {
      service,
      options: RequestOptions::default(),
      initial_params: None,
      initial_data: None,
      cache_key: None,
      store: None,
      platform: None,
      dependencies: Vec::new(),
    }
  }

  /// Skips the automatic first run. The request only fetches when `run` is
  /// called or a background trigger fires.
  pub fn manual(mut self, manual: bool) -> Self {
    self.options.manual = manual;
    self
  }

  /// The params for the automatic first run and for background triggers until
  /// the first manual call.
  pub fn initial_params(mut self, params: P) -> Self {
    self.initial_params = Some(params);
    self
  }

  /// Data to show before the first result. A cached entry takes precedence.
  pub fn initial_data(mut self, data: D) -> Self {
    self.initial_data = Some(Arc::new(data));
    self
  }

  /// Shares results under a fixed cache key.
  pub fn cache_key(mut self, key: impl Into<String>) -> Self {
    self.cache_key = Some(CacheKey::Static(key.into()));
    self
  }

  /// Derives the cache key from each invocation's params.
  pub fn cache_key_fn(mut self, f: impl Fn(&P) -> String + Send + Sync + 'static) -> Self {
    self.cache_key = Some(CacheKey::Dynamic(Arc::new(f)));
    self
  }

  /// The store to read and write. Requests built with clones of one store see
  /// each other's results. Defaults to a fresh in-memory store.
  pub fn cache_store(mut self, store: CacheStore<P, D>) -> Self {
    self.store = Some(store);
    self
  }

  /// Throttles manual calls. A bare `Duration` is a leading and trailing
  /// throttle of that length.
  pub fn throttle(mut self, options: impl Into<ThrottleOptions>) -> Self {
    self.options.throttle = Some(options.into().0);
    self
  }

  /// Debounces manual calls. A bare `Duration` is a trailing debounce of that
  /// length.
  pub fn debounce(mut self, options: impl Into<RateOptions>) -> Self {
    self.options.debounce = Some(options.into());
    self
  }

  pub fn refresh_on_focus(mut self, enabled: bool) -> Self {
    self.options.refresh_on_focus = enabled;
    self
  }

  /// Minimum spacing between focus-triggered refreshes. Defaults to `5 seconds`.
  pub fn refresh_on_focus_throttle_wait(mut self, wait: Duration) -> Self {
    self.options.refresh_on_focus_throttle_wait = wait;
    self
  }

  pub fn refresh_on_reconnect(mut self, enabled: bool) -> Self {
    self.options.refresh_on_reconnect = enabled;
    self
  }

  /// Revalidates every `every`. `Duration::ZERO`, the default, disables it.
  pub fn refresh_interval(mut self, every: Duration) -> Self {
    self.options.refresh_interval = every;
    self
  }

  /// Keeps the interval firing while the platform reports hidden.
  pub fn refresh_when_hidden(mut self, enabled: bool) -> Self {
    self.options.refresh_when_hidden = enabled;
    self
  }

  /// Keeps the interval firing while the platform reports offline.
  pub fn refresh_when_offline(mut self, enabled: bool) -> Self {
    self.options.refresh_when_offline = enabled;
    self
  }

  /// Revalidates whenever `dependency` changes. The value it holds now does
  /// not count as a change.
  pub fn refresh_dependency<T>(mut self, dependency: watch::Receiver<T>) -> Self
  where
    T: Send + Sync + 'static,
  {
    self.dependencies.push(scheduler::dependency_watcher(dependency));
    self
  }

  /// Retries after the first failure. Defaults to `0`.
  pub fn error_retry_count(mut self, count: u32) -> Self {
    self.options.error_retry_count = count;
    self
  }

  /// The wait before each retry. Defaults to `min(1s * 2^(n-1), 30s)`.
  pub fn error_retry_interval(mut self, interval: impl Into<RetryInterval>) -> Self {
    self.options.error_retry_interval = interval.into();
    self
  }

  /// Flags `loading_slow` once a chain runs longer than `timeout`.
  /// `Duration::ZERO`, the default, disables it.
  pub fn loading_timeout(mut self, timeout: Duration) -> Self {
    self.options.loading_timeout = timeout;
    self
  }

  /// The visibility, focus and connectivity source for background triggers.
  /// Defaults to a platform that is always visible, focused and online.
  pub fn platform(mut self, platform: Platform) -> Self {
    self.platform = Some(platform);
    self
  }

  pub fn on_before(mut self, f: impl Fn(&P) + Send + Sync + 'static) -> Self {
    self.options.callbacks.on_before = Some(Arc::new(f));
    self
  }

  pub fn on_success(mut self, f: impl Fn(&Arc<D>, &P) + Send + Sync + 'static) -> Self {
    self.options.callbacks.on_success = Some(Arc::new(f));
    self
  }

  pub fn on_error(mut self, f: impl Fn(&E, &P) + Send + Sync + 'static) -> Self {
    self.options.callbacks.on_error = Some(Arc::new(f));
    self
  }

  pub fn on_error_retry(mut self, f: impl Fn(&E, u32) + Send + Sync + 'static) -> Self {
    self.options.callbacks.on_error_retry = Some(Arc::new(f));
    self
  }

  pub fn on_retry_failed(mut self, f: impl Fn(&E) + Send + Sync + 'static) -> Self {
    self.options.callbacks.on_retry_failed = Some(Arc::new(f));
    self
  }

  pub fn on_finally(mut self, f: impl Fn(&P, Option<&Arc<D>>, Option<&Arc<E>>) + Send + Sync + 'static) -> Self {
    self.options.callbacks.on_finally = Some(Arc::new(f));
    self
  }

  pub fn on_loading_slow(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
    self.options.callbacks.on_loading_slow = Some(Arc::new(f));
    self
  }

  /// Builds the request and, unless `manual`, starts the first run.
  ///
  /// A cached entry under the initial key seeds `data` (and `params`, when no
  /// initial params were given) before anything is fetched. Must be called
  /// from within a Tokio runtime.
  pub fn build(self) -> Result<Request<P, D, E>, BuildError> {
    let spawner = TokioSpawner::current()?;
    let store = self.store.unwrap_or_default();
    let platform = self.platform.unwrap_or_default();

    let key = self
      .cache_key
      .as_ref()
      .and_then(|cache_key| cache_key.resolve(self.initial_params.as_ref()));
    let cached = match key.as_deref().map(|key| store.get(key)) {
      Some(Ok(entry)) => entry,
      Some(Err(error)) => {
        tracing::warn!(key = key.as_deref().unwrap_or(""), error = %error, "cache read failed");
        None
      }
      None => None,
    };
    let (cached_data, cached_params) = match cached {
      Some(entry) => (Some(entry.data), entry.params),
      None => (None, None),
    };

    let params = self.initial_params.or(cached_params);
    let data = cached_data.or(self.initial_data);
    let manual = self.options.manual;
    if !manual && params.is_none() {
      return Err(BuildError::MissingInitialParams);
    }

    let (state, _) = watch::channel(RequestState {
      data,
      error: None,
      loading: false,
      loading_slow: false,
      params: params.clone(),
      active: true,
    });
    let (key_sender, _) = watch::channel(key);
    let options = self.options;
    let refresh_interval = options.refresh_interval;
    let service = self.service;
    let cache_key = self.cache_key;

    let inner = Arc::new_cyclic(|weak: &Weak<RequestInner<P, D, E>>| {
      let target: Weak<dyn Revalidate> = weak.clone();
      let rate = RequestInner::rate_control(&options, &spawner, weak.clone());
      RequestInner {
        service,
        options: Mutex::new(Arc::new(options)),
        cache_key,
        store,
        guard: Arc::new(VersionGuard::new()),
        gate: PausableGate::default(),
        state,
        key: key_sender,
        spawner: spawner.clone(),
        metrics: Arc::new(Metrics::new()),
        rate: Mutex::new(Arc::new(rate)),
        scheduler: Mutex::new(RevalidationScheduler::new(spawner.clone(), platform, target)),
        cache_listener: Mutex::new(None),
        slow_timer: Mutex::new(None),
        torn_down: AtomicBool::new(false),
        weak_self: weak.clone(),
      }
    });

    {
      let mut scheduler = inner.scheduler.lock();
      scheduler.listen_platform();
      for dependency in self.dependencies {
        scheduler.watch_dependency(dependency);
      }
      scheduler.set_interval(refresh_interval);
      scheduler.start_interval();
    }
    *inner.cache_listener.lock() = Some(inner.spawn_cache_listener());

    tracing::debug!(
      manual,
      key = inner.key.borrow().as_deref().unwrap_or(""),
      "request built"
    );

    if !manual {
      if let Some(params) = params {
        inner.invoke(params, Trigger::Mount, None);
      }
    }

    Ok(Request { inner })
  }
}

/// Throttle options. Unlike [`RateOptions`]'s own `From<Duration>`, a bare
/// duration here means a throttle, not a debounce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleOptions(pub RateOptions);

impl From<Duration> for ThrottleOptions {
  fn from(wait: Duration) -> Self {
    ThrottleOptions(RateOptions::throttle(wait))
  }
}

impl From<RateOptions> for ThrottleOptions {
  fn from(options: RateOptions) -> Self {
    ThrottleOptions(options)
  }
}
