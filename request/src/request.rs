//! The request coordinator.
//!
//! A [`Request`] owns the visible state of one data-fetching operation and
//! funnels every trigger (manual calls, the interval, focus, reconnect,
//! dependency changes, shared cache invalidation) into one execution path:
//!
//! 1. A fresh [`Version`] is taken from the guard. Anything older is now
//!    superseded.
//! 2. `loading` and `params` are published and `on_before` fires, before the
//!    call returns.
//! 3. A task runs the retry chain. Its outcome is committed through
//!    `run_if_current`, together with the cache write, or dropped.

use crate::builder::RequestBuilder;
use crate::error::{CacheError, RequestError};
use crate::gate::PausableGate;
use crate::guard::{Version, VersionGuard};
use crate::metrics::{Metrics, MetricsSnapshot};
use crate::options::{CacheKey, RequestOptions};
use crate::rate::{RateControl, Sink};
use crate::retry::{RetryController, RetryHooks, RetryOutcome, RetryPolicy, Service};
use crate::runtime::TokioSpawner;
use crate::scheduler::{Revalidate, RevalidationScheduler, Trigger, TriggerRegistration};
use crate::slow::{SlowLoadingDetector, SlowTimer};
use crate::state::RequestState;
use crate::store::{CacheEntry, CacheEvent, CacheStore, CacheSubscription, Mutation};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;

type Reply<D, E> = oneshot::Sender<Result<Arc<D>, RequestError<E>>>;

fn send_reply<D, E>(reply: Option<Reply<D, E>>, result: Result<Arc<D>, RequestError<E>>) {
  if let Some(reply) = reply {
    // The caller may have stopped waiting.
    let _ = reply.send(result);
  }
}

/// A manual call waiting in the rate-control window.
pub(crate) struct ManualCall<P, D, E> {
  params: Option<P>,
  reply: Option<Reply<D, E>>,
  metrics: Arc<Metrics>,
}

impl<P, D, E> Drop for ManualCall<P, D, E> {
  fn drop(&mut self) {
    // Still holding params means the window dropped this call.
    if self.params.take().is_some() {
      Metrics::incr(&self.metrics.rate_limited);
      tracing::debug!("manual call dropped by rate control");
      send_reply(self.reply.take(), Err(RequestError::RateLimited));
    }
  }
}

enum ListenerWake {
  Event(Option<(String, CacheEvent)>),
  Rekey(bool),
}

/// The internal, shared core of a `Request`.
pub(crate) struct RequestInner<P, D, E> {
  pub(crate) service: Service<P, D, E>,
  pub(crate) options: Mutex<Arc<RequestOptions<P, D, E>>>,
  pub(crate) cache_key: Option<CacheKey<P>>,
  pub(crate) store: CacheStore<P, D>,
  pub(crate) guard: Arc<VersionGuard>,
  pub(crate) gate: PausableGate,
  pub(crate) state: watch::Sender<RequestState<P, D, E>>,
  // The key the most recent invocation resolved to. The cache listener
  // follows it.
  pub(crate) key: watch::Sender<Option<String>>,
  pub(crate) spawner: TokioSpawner,
  pub(crate) metrics: Arc<Metrics>,
  pub(crate) rate: Mutex<Arc<RateControl<ManualCall<P, D, E>>>>,
  pub(crate) scheduler: Mutex<RevalidationScheduler>,
  pub(crate) cache_listener: Mutex<Option<JoinHandle<()>>>,
  pub(crate) slow_timer: Mutex<Option<SlowTimer>>,
  pub(crate) torn_down: AtomicBool,
  pub(crate) weak_self: Weak<Self>,
}

impl<P, D, E> RequestInner<P, D, E>
where
  P: Clone + PartialEq + Send + Sync + 'static,
  D: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  pub(crate) fn rate_control(
    options: &RequestOptions<P, D, E>,
    spawner: &TokioSpawner,
    request: Weak<Self>,
  ) -> RateControl<ManualCall<P, D, E>> {
    let sink: Sink<ManualCall<P, D, E>> = Arc::new(move |mut call: ManualCall<P, D, E>| {
      let Some(params) = call.params.take() else {
        return;
      };
      let reply = call.reply.take();
      match request.upgrade() {
        Some(inner) => inner.invoke(params, Trigger::Manual, reply),
        None => send_reply(reply, Err(RequestError::TornDown)),
      }
    });
    RateControl::new(options.debounce, options.throttle, spawner, sink)
  }

  pub(crate) fn options(&self) -> Arc<RequestOptions<P, D, E>> {
    Arc::clone(&self.options.lock())
  }

  fn submit_manual(&self, params: P, reply: Option<Reply<D, E>>) {
    if self.torn_down.load(Ordering::Acquire) {
      send_reply(reply, Err(RequestError::TornDown));
      return;
    }
    let call = ManualCall {
      params: Some(params),
      reply,
      metrics: Arc::clone(&self.metrics),
    };
    // Released before submitting: the sink may run synchronously and call
    // back into this request.
    let rate = Arc::clone(&self.rate.lock());
    rate.submit(call);
  }

  /// Starts a call chain. Everything up to spawning the chain happens before
  /// this returns, so `loading` is already visible to the caller.
  pub(crate) fn invoke(&self, params: P, trigger: Trigger, reply: Option<Reply<D, E>>) {
    if self.torn_down.load(Ordering::Acquire) {
      send_reply(reply, Err(RequestError::TornDown));
      return;
    }

    let options = self.options();
    let version = self.guard.next();
    Metrics::incr(&self.metrics.invocations);
    if trigger.is_background() {
      Metrics::incr(&self.metrics.revalidations);
    }

    let key = self.cache_key.as_ref().and_then(|k| k.resolve(Some(&params)));
    let key_changed = self.key.send_if_modified(|current| {
      if *current == key {
        false
      } else {
        current.clone_from(&key);
        true
      }
    });
    // A new key shows its cached entry, if any, while the fetch runs.
    let cached = if key_changed {
      key.as_deref().and_then(|key| self.read_cache(key))
    } else {
      None
    };

    self.state.send_modify(|state| {
      state.loading = true;
      state.loading_slow = false;
      state.params = Some(params.clone());
      if let Some(entry) = cached {
        state.data = Some(entry.data);
      }
    });

    tracing::debug!(
      version = version.get(),
      key = key.as_deref().unwrap_or(""),
      source = %trigger,
      "invocation started"
    );

    if let Some(on_before) = &options.callbacks.on_before {
      on_before(&params);
    }

    // Replacing the slot drops, and so cancels, the previous chain's timer.
    let slow_timer = SlowLoadingDetector::new(options.loading_timeout).arm(&self.spawner, self.slow_callback(version));
    *self.slow_timer.lock() = slow_timer;

    let controller = RetryController::new(
      Arc::clone(&self.service),
      RetryPolicy::new(options.error_retry_count, options.error_retry_interval.clone()),
    );
    let guard = Arc::clone(&self.guard);
    let request = self.weak_self.clone();

    self.spawner.spawn(async move {
      let hooks = ChainHooks {
        request: request.clone(),
        params: params.clone(),
      };
      let outcome = controller.call(params.clone(), &guard, version, &hooks).await;
      match request.upgrade() {
        Some(inner) => inner.settle(version, trigger, params, key, outcome, reply),
        None => send_reply(reply, Err(RequestError::TornDown)),
      }
    });
  }

  fn settle(
    &self,
    version: Version,
    trigger: Trigger,
    params: P,
    key: Option<String>,
    outcome: RetryOutcome<D, E>,
    reply: Option<Reply<D, E>>,
  ) {
    let options = self.options();

    match outcome {
      RetryOutcome::Succeeded(data) => {
        let data = Arc::new(data);
        let committed = self.guard.run_if_current(version, || {
          let written = match &key {
            Some(key) => self.store.set(key, Arc::clone(&data), Some(params.clone())),
            None => Ok(()),
          };
          self.state.send_modify(|state| {
            state.data = Some(Arc::clone(&data));
            state.error = None;
            state.loading = false;
            state.loading_slow = false;
          });
          self.slow_timer.lock().take();
          written
        });

        let Some(written) = committed else {
          return self.superseded(version, reply);
        };

        Metrics::incr(&self.metrics.successes);
        tracing::debug!(version = version.get(), source = %trigger, "result committed");

        if let Some(on_success) = &options.callbacks.on_success {
          on_success(&data, &params);
        }
        if let Some(on_finally) = &options.callbacks.on_finally {
          on_finally(&params, Some(&data), None);
        }

        let result = match written {
          Ok(()) => Ok(data),
          Err(error) => {
            tracing::warn!(key = key.as_deref().unwrap_or(""), error = %error, "cache write failed");
            Err(RequestError::Provider(error))
          }
        };
        send_reply(reply, result);
      }
      RetryOutcome::Exhausted(error) => {
        let error = Arc::new(error);
        let committed = self.guard.run_if_current(version, || {
          self.state.send_modify(|state| {
            state.error = Some(Arc::clone(&error));
            state.loading = false;
            state.loading_slow = false;
          });
          self.slow_timer.lock().take();
        });

        if committed.is_none() {
          return self.superseded(version, reply);
        }

        Metrics::incr(&self.metrics.failures);
        if trigger.is_background() {
          tracing::warn!(version = version.get(), source = %trigger, "background revalidation failed");
        } else {
          tracing::debug!(version = version.get(), source = %trigger, "request failed");
        }

        // After the commit, so the callbacks see `error` set and `loading`
        // cleared.
        if let Some(on_retry_failed) = &options.callbacks.on_retry_failed {
          on_retry_failed(&error);
        }
        if let Some(on_finally) = &options.callbacks.on_finally {
          on_finally(&params, None, Some(&error));
        }
        send_reply(reply, Err(RequestError::Fetch(error)));
      }
      RetryOutcome::Superseded => self.superseded(version, reply),
    }
  }

  fn superseded(&self, version: Version, reply: Option<Reply<D, E>>) {
    Metrics::incr(&self.metrics.superseded);
    tracing::debug!(version = version.get(), "stale completion dropped");
    send_reply(reply, Err(RequestError::Superseded));
  }

  fn slow_callback(&self, version: Version) -> impl FnOnce() + Send + 'static {
    let request = self.weak_self.clone();
    move || {
      let Some(inner) = request.upgrade() else {
        return;
      };
      let flagged = inner.guard.run_if_current(version, || {
        inner.state.send_if_modified(|state| {
          if state.loading && !state.loading_slow {
            state.loading_slow = true;
            true
          } else {
            false
          }
        })
      });
      if flagged == Some(true) {
        Metrics::incr(&inner.metrics.slow_loads);
        tracing::debug!(version = version.get(), "loading is slow");
        if let Some(on_loading_slow) = &inner.options().callbacks.on_loading_slow {
          on_loading_slow();
        }
      }
    }
  }

  fn read_cache(&self, key: &str) -> Option<CacheEntry<P, D>> {
    match self.store.get(key) {
      Ok(entry) => entry,
      Err(error) => {
        tracing::warn!(key = %key, error = %error, "cache read failed");
        None
      }
    }
  }

  /// Handles one wake of the cache listener. `invalidated` is whether the
  /// key's invalidation epoch moved since the previous wake; events
  /// themselves may have been dropped by a full mailbox.
  fn on_cache_event(&self, key: &str, event: CacheEvent, invalidated: bool) {
    if self.key.borrow().as_deref() != Some(key) {
      return;
    }

    if event == CacheEvent::Set {
      if let Some(entry) = self.read_cache(key) {
        let updated = self.state.send_if_modified(|state| {
          let same = state
            .data
            .as_ref()
            .is_some_and(|data| Arc::ptr_eq(data, &entry.data));
          if !same {
            state.data = Some(Arc::clone(&entry.data));
          }
          !same
        });
        if updated {
          tracing::trace!(key = %key, "picked up shared cache write");
        }
      }
    }

    // The stale data stays visible while the refetch runs.
    if invalidated {
      tracing::debug!(key = %key, event = %event, "cache entry invalidated");
      self.revalidate(Trigger::Invalidated);
    }
  }

  pub(crate) fn spawn_cache_listener(&self) -> JoinHandle<()> {
    let request = self.weak_self.clone();
    let store = self.store.clone();
    let mut keys = self.key.subscribe();
    let initial = keys.borrow_and_update().clone();
    // Epoch first: an invalidation racing the subscription is then caught on
    // the next wake instead of being counted as already seen.
    let mut seen_epoch = initial.as_deref().map_or(0, |key| store.invalidation_epoch(key));
    // Subscribed before spawning, so no write after `build()` returns is missed.
    let mut subscription: Option<CacheSubscription> = initial.as_deref().map(|key| store.subscribe(key));

    self.spawner.spawn(async move {
      loop {
        let wake = match &subscription {
          Some(subscription) => tokio::select! {
            event = subscription.recv() => ListenerWake::Event(event),
            changed = keys.changed() => ListenerWake::Rekey(changed.is_ok()),
          },
          None => ListenerWake::Rekey(keys.changed().await.is_ok()),
        };

        match wake {
          ListenerWake::Rekey(false) | ListenerWake::Event(None) => return,
          ListenerWake::Rekey(true) => {
            let key = keys.borrow_and_update().clone();
            seen_epoch = key.as_deref().map_or(0, |key| store.invalidation_epoch(key));
            subscription = match (key, subscription.take()) {
              (Some(key), Some(mut current)) => {
                current.rekey(&key);
                Some(current)
              }
              (Some(key), None) => Some(store.subscribe(&key)),
              (None, _) => None,
            };
          }
          ListenerWake::Event(Some((key, event))) => {
            // Queued events for a key this listener already left.
            if subscription.as_ref().and_then(|s| s.key()) != Some(key.as_str()) {
              continue;
            }
            let epoch = store.invalidation_epoch(&key);
            let invalidated = epoch != seen_epoch;
            seen_epoch = epoch;

            let Some(inner) = request.upgrade() else {
              return;
            };
            inner.on_cache_event(&key, event, invalidated);
          }
        }
      }
    })
  }

  fn cancel(&self) {
    let version = self.guard.next();
    self.rate.lock().cancel();
    self.slow_timer.lock().take();
    self.gate.pause();
    self.scheduler.lock().stop_interval();
    self.state.send_modify(|state| {
      state.loading = false;
      state.loading_slow = false;
      state.active = false;
    });
    tracing::debug!(version = version.get(), "request cancelled");
  }

  fn set_active(&self, active: bool, force_refresh: bool) {
    if force_refresh {
      self.state.send_modify(|state| state.active = active);
    } else {
      self.state.send_if_modified(|state| {
        state.active = active;
        false
      });
    }
  }
}

impl<P, D, E> Revalidate for RequestInner<P, D, E>
where
  P: Clone + PartialEq + Send + Sync + 'static,
  D: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  fn revalidate(&self, trigger: Trigger) {
    if !self.gate.is_active() {
      tracing::trace!(source = %trigger, "revalidation skipped: paused");
      return;
    }
    let params = self.state.borrow().params.clone();
    let Some(params) = params else {
      tracing::debug!(source = %trigger, "revalidation skipped: no params yet");
      return;
    };
    self.invoke(params, trigger, None);
  }

  fn registration(&self) -> TriggerRegistration {
    let options = self.options();
    TriggerRegistration {
      refresh_on_focus: options.refresh_on_focus,
      refresh_on_focus_throttle_wait: options.refresh_on_focus_throttle_wait,
      refresh_on_reconnect: options.refresh_on_reconnect,
      refresh_when_hidden: options.refresh_when_hidden,
      refresh_when_offline: options.refresh_when_offline,
    }
  }
}

impl<P, D, E> Drop for RequestInner<P, D, E> {
  fn drop(&mut self) {
    if let Some(listener) = self.cache_listener.get_mut().take() {
      listener.abort();
    }
    self.scheduler.get_mut().shutdown();
  }
}

/// Retry callbacks for one chain. Reads the latest callbacks on every event.
struct ChainHooks<P, D, E> {
  request: Weak<RequestInner<P, D, E>>,
  params: P,
}

impl<P, D, E> RetryHooks<E> for ChainHooks<P, D, E>
where
  P: Clone + PartialEq + Send + Sync + 'static,
  D: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  fn on_error(&self, error: &E, attempt: u32) {
    let Some(inner) = self.request.upgrade() else {
      return;
    };
    tracing::debug!(attempt, "attempt failed");
    if let Some(on_error) = &inner.options().callbacks.on_error {
      on_error(error, &self.params);
    }
  }

  fn on_error_retry(&self, error: &E, attempt: u32, _waited: Duration) {
    let Some(inner) = self.request.upgrade() else {
      return;
    };
    Metrics::incr(&inner.metrics.retries);
    if let Some(on_error_retry) = &inner.options().callbacks.on_error_retry {
      on_error_retry(error, attempt);
    }
  }
}

/// A cheaply cloneable handle to one data-fetching operation and its state.
///
/// Dropping the last handle tears the request down. Background tasks only hold
/// weak references.
///
/// # Examples
///
/// ```ignore
/// let user = Request::builder(|id: u32| async move { fetch_user(id).await })
///   .initial_params(1)
///   .cache_key_fn(|id| format!("user:{id}"))
///   .error_retry_count(2)
///   .build()?;
///
/// assert!(user.initializing());
/// let mut state = user.subscribe();
/// state.wait_for(|state| !state.loading).await?;
/// ```
pub struct Request<P, D, E> {
  pub(crate) inner: Arc<RequestInner<P, D, E>>,
}

impl<P, D, E> Clone for Request<P, D, E> {
  fn clone(&self) -> Self {
    Self {
      inner: Arc::clone(&self.inner),
    }
  }
}

impl<P, D, E> Request<P, D, E>
where
  P: Clone + PartialEq + Send + Sync + 'static,
  D: Send + Sync + 'static,
  E: Send + Sync + 'static,
{
  /// Starts building a request around `service`.
  pub fn builder<F, Fut>(service: F) -> RequestBuilder<P, D, E>
  where
    F: Fn(P) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<D, E>> + Send + 'static,
  {
    RequestBuilder::new(service)
  }

  /// Runs the operation with `params`, through throttle/debounce.
  ///
  /// Fire-and-forget: the outcome lands in the visible state and callbacks.
  pub fn run(&self, params: P) {
    self.inner.submit_manual(params, None);
  }

  /// Runs the operation with `params`, through throttle/debounce, and waits
  /// for this call's own outcome.
  ///
  /// Besides updating the visible state like [`run`](Self::run), failures are
  /// returned to the caller: the last error once retries are exhausted,
  /// `Superseded` if a newer call or `cancel()` overtook this one,
  /// `RateLimited` if the rate-control window dropped this call, and
  /// `Aborted` if the operation panicked.
  pub async fn run_async(&self, params: P) -> Result<Arc<D>, RequestError<E>> {
    let (reply, outcome) = oneshot::channel();
    self.inner.submit_manual(params, Some(reply));
    // Every path that drops a call replies first. A closed channel means the
    // chain task itself died.
    outcome.await.unwrap_or(Err(RequestError::Aborted))
  }

  /// Runs again with the params of the most recent invocation.
  pub fn refresh(&self) {
    match self.params() {
      Some(params) => self.run(params),
      None => tracing::debug!("refresh skipped: no params yet"),
    }
  }

  /// Like [`refresh`](Self::refresh), waiting for the outcome.
  pub async fn refresh_async(&self) -> Result<Arc<D>, RequestError<E>> {
    match self.params() {
      Some(params) => self.run_async(params).await,
      None => Err(RequestError::MissingParams),
    }
  }

  /// Drops the result of any in-flight call and pauses background triggers.
  ///
  /// The operation itself keeps running; only its effects are suppressed.
  /// Pending rate-controlled calls are dropped. A later manual `run` works as
  /// usual, but background triggers stay paused until [`resume`](Self::resume).
  pub fn cancel(&self) {
    self.inner.cancel();
  }

  /// Overwrites the visible data and the cache entry without fetching.
  ///
  /// An in-flight fetch is not cancelled and will overwrite this value when it
  /// completes.
  pub fn mutate(&self, mutation: Mutation<D>) -> Result<(), CacheError> {
    let (prev, params) = {
      let state = self.inner.state.borrow();
      (state.data.clone(), state.params.clone())
    };
    let next = mutation.apply(prev.as_ref());

    let key = self.inner.key.borrow().clone();
    if let Some(key) = key {
      self.inner.store.set(&key, Arc::clone(&next), params)?;
    }
    self.inner.state.send_modify(|state| state.data = Some(next));
    Ok(())
  }

  /// Replaces the options snapshot.
  ///
  /// In-flight chains pick up the new callbacks. A changed `refresh_interval`
  /// restarts the interval; changed throttle/debounce options replace the
  /// rate-control window, dropping whatever it held.
  pub fn reconfigure(&self, f: impl FnOnce(&mut RequestOptions<P, D, E>)) {
    let mut next = (*self.inner.options()).clone();
    f(&mut next);
    let next = Arc::new(next);
    let prev = std::mem::replace(&mut *self.inner.options.lock(), Arc::clone(&next));

    if prev.throttle != next.throttle || prev.debounce != next.debounce {
      let rate = RequestInner::rate_control(&next, &self.inner.spawner, Arc::downgrade(&self.inner));
      let old = std::mem::replace(&mut *self.inner.rate.lock(), Arc::new(rate));
      old.cancel();
    }

    if prev.refresh_interval != next.refresh_interval {
      let mut scheduler = self.inner.scheduler.lock();
      scheduler.set_interval(next.refresh_interval);
      if self.inner.gate.is_active() {
        scheduler.start_interval();
      }
    }
    tracing::debug!("request reconfigured");
  }

  /// Cancels and stops every background task. Later calls fail with
  /// `RequestError::TornDown`.
  pub fn teardown(&self) {
    self.inner.torn_down.store(true, Ordering::Release);
    self.inner.cancel();
    self.inner.scheduler.lock().shutdown();
    if let Some(listener) = self.inner.cache_listener.lock().take() {
      listener.abort();
    }
  }

  /// Stops background triggers. In-flight calls are not affected.
  ///
  /// With `force_refresh`, state observers are notified of the change
  /// immediately; otherwise the flag changes silently.
  pub fn pause(&self, force_refresh: bool) {
    self.inner.gate.pause();
    self.inner.scheduler.lock().stop_interval();
    self.inner.set_active(false, force_refresh);
  }

  /// Re-enables background triggers and restarts the interval.
  pub fn resume(&self, force_refresh: bool) {
    if self.inner.torn_down.load(Ordering::Acquire) {
      return;
    }
    self.inner.gate.resume();
    self.inner.scheduler.lock().start_interval();
    self.inner.set_active(true, force_refresh);
  }

  pub fn is_active(&self) -> bool {
    self.inner.gate.is_active()
  }

  pub fn data(&self) -> Option<Arc<D>> {
    self.inner.state.borrow().data.clone()
  }

  pub fn error(&self) -> Option<Arc<E>> {
    self.inner.state.borrow().error.clone()
  }

  pub fn loading(&self) -> bool {
    self.inner.state.borrow().loading
  }

  pub fn loading_slow(&self) -> bool {
    self.inner.state.borrow().loading_slow
  }

  /// Loading with no data yet.
  pub fn initializing(&self) -> bool {
    self.inner.state.borrow().initializing()
  }

  /// Loading while showing earlier data.
  pub fn refreshing(&self) -> bool {
    self.inner.state.borrow().refreshing()
  }

  /// The params of the most recent invocation, or the initial ones.
  pub fn params(&self) -> Option<P> {
    self.inner.state.borrow().params.clone()
  }

  /// A copy of the whole visible state.
  pub fn state(&self) -> RequestState<P, D, E> {
    self.inner.state.borrow().clone()
  }

  /// Observes the visible state.
  pub fn subscribe(&self) -> watch::Receiver<RequestState<P, D, E>> {
    self.inner.state.subscribe()
  }

  /// The cache key the most recent invocation used.
  pub fn cache_key(&self) -> Option<String> {
    self.inner.key.borrow().clone()
  }

  pub fn store(&self) -> &CacheStore<P, D> {
    &self.inner.store
  }

  /// The current options snapshot.
  pub fn options(&self) -> Arc<RequestOptions<P, D, E>> {
    self.inner.options()
  }

  /// Returns a snapshot of the request's counters.
  pub fn metrics(&self) -> MetricsSnapshot {
    self.inner.metrics.snapshot()
  }
}

impl<P, D, E> fmt::Debug for Request<P, D, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Request")
      .field("state", &*self.inner.state.borrow())
      .field("key", &*self.inner.key.borrow())
      .field("active", &self.inner.gate.is_active())
      .finish_non_exhaustive()
  }
}
