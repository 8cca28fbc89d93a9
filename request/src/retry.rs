//! Bounded retry with backoff around a fallible async operation.
//!
//! The controller never returns the operation's error as an `Err`: a chain
//! ends as a [`RetryOutcome`], and failures are otherwise reported only
//! through [`RetryHooks`]. The request turns an `Exhausted` outcome into its
//! visible `error` state.

use crate::guard::{Version, VersionGuard};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::BoxFuture;

/// A type-erased async operation taking params `P`.
pub type Service<P, D, E> = Arc<dyn Fn(P) -> BoxFuture<'static, Result<D, E>> + Send + Sync>;

const BACKOFF_BASE: Duration = Duration::from_secs(1);
const BACKOFF_CAP: Duration = Duration::from_secs(30);

/// How long to wait before retry number `n` (1-based).
#[derive(Clone, Default)]
pub enum RetryInterval {
  /// `min(1s * 2^(n-1), 30s)`.
  #[default]
  Exponential,
  /// The same wait before every retry.
  Fixed(Duration),
  /// A custom function of the retry number.
  Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl RetryInterval {
  pub fn custom(f: impl Fn(u32) -> Duration + Send + Sync + 'static) -> Self {
    RetryInterval::Custom(Arc::new(f))
  }

  /// Returns the wait before retry number `attempt`.
  pub fn wait(&self, attempt: u32) -> Duration {
    match self {
      RetryInterval::Exponential => {
        let exponent = attempt.saturating_sub(1).min(31);
        BACKOFF_BASE
          .checked_mul(1u32 << exponent)
          .map_or(BACKOFF_CAP, |wait| wait.min(BACKOFF_CAP))
      }
      RetryInterval::Fixed(wait) => *wait,
      RetryInterval::Custom(f) => f(attempt),
    }
  }
}

impl From<Duration> for RetryInterval {
  fn from(wait: Duration) -> Self {
    RetryInterval::Fixed(wait)
  }
}

impl fmt::Debug for RetryInterval {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      RetryInterval::Exponential => f.write_str("Exponential"),
      RetryInterval::Fixed(wait) => f.debug_tuple("Fixed").field(wait).finish(),
      RetryInterval::Custom(_) => f.write_str("Custom(..)"),
    }
  }
}

/// How many times to retry, and how long to wait in between.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
  /// Retries after the first failure. `0` means a single attempt.
  pub count: u32,
  pub interval: RetryInterval,
}

impl RetryPolicy {
  pub fn new(count: u32, interval: impl Into<RetryInterval>) -> Self {
    Self {
      count,
      interval: interval.into(),
    }
  }
}

/// Callbacks fired by the controller while a chain runs. All default to no-ops.
///
/// Exhaustion has no hook here: it is reported by the returned outcome, so
/// the caller can commit the error before telling anyone.
pub trait RetryHooks<E> {
  /// An attempt failed. `attempt` is the 1-based count of failures so far.
  fn on_error(&self, _error: &E, _attempt: u32) {}

  /// The backoff for retry `attempt` elapsed; the retry is about to start.
  fn on_error_retry(&self, _error: &E, _attempt: u32, _waited: Duration) {}
}

impl<E> RetryHooks<E> for () {}

/// How a call chain ended.
#[derive(Debug)]
pub enum RetryOutcome<D, E> {
  Succeeded(D),
  /// Every attempt failed; holds the last error.
  Exhausted(E),
  /// The chain's version stopped being current. Nothing was reported.
  Superseded,
}

// Per-chain bookkeeping. Lives for one chain: the first attempt plus its
// retries.
#[derive(Debug)]
struct RetryState {
  current_count: u32,
  retry_count: u32,
  version: Version,
}

/// Wraps a service with the retry policy.
pub struct RetryController<P, D, E> {
  service: Service<P, D, E>,
  policy: RetryPolicy,
}

impl<P, D, E> RetryController<P, D, E>
where
  P: Clone,
{
  pub fn new(service: Service<P, D, E>, policy: RetryPolicy) -> Self {
    Self { service, policy }
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }

  /// Runs one call chain tagged with `version`.
  ///
  /// The chain stops as `Superseded`, without firing any hook, as soon as an
  /// attempt settles or a backoff ends while `version` is no longer current.
  pub async fn call<H>(&self, params: P, guard: &VersionGuard, version: Version, hooks: &H) -> RetryOutcome<D, E>
  where
    H: RetryHooks<E> + ?Sized,
  {
    let mut state = RetryState {
      current_count: 0,
      retry_count: self.policy.count,
      version,
    };

    loop {
      let result = (self.service)(params.clone()).await;
      if !guard.is_current(state.version) {
        return RetryOutcome::Superseded;
      }

      let error = match result {
        Ok(data) => return RetryOutcome::Succeeded(data),
        Err(error) => error,
      };

      state.current_count += 1;
      hooks.on_error(&error, state.current_count);

      if state.current_count > state.retry_count {
        tracing::debug!(
          version = state.version.get(),
          attempts = state.current_count,
          "retries exhausted"
        );
        return RetryOutcome::Exhausted(error);
      }

      let wait = self.policy.interval.wait(state.current_count);
      tracing::debug!(
        version = state.version.get(),
        attempt = state.current_count,
        wait_ms = wait.as_millis() as u64,
        "attempt failed, retrying after backoff"
      );
      tokio::time::sleep(wait).await;

      if !guard.is_current(state.version) {
        return RetryOutcome::Superseded;
      }
      hooks.on_error_retry(&error, state.current_count, wait);
    }
  }
}

impl<P, D, E> fmt::Debug for RetryController<P, D, E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RetryController")
      .field("policy", &self.policy)
      .finish_non_exhaustive()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn exponential_backoff_doubles_then_caps() {
    let interval = RetryInterval::Exponential;
    assert_eq!(interval.wait(1), Duration::from_secs(1));
    assert_eq!(interval.wait(2), Duration::from_secs(2));
    assert_eq!(interval.wait(3), Duration::from_secs(4));
    assert_eq!(interval.wait(5), Duration::from_secs(16));
    assert_eq!(interval.wait(6), Duration::from_secs(30));
    assert_eq!(interval.wait(40), Duration::from_secs(30));
  }

  #[test]
  fn fixed_and_custom_intervals() {
    let fixed = RetryInterval::from(Duration::from_millis(250));
    assert_eq!(fixed.wait(1), Duration::from_millis(250));
    assert_eq!(fixed.wait(9), Duration::from_millis(250));

    let linear = RetryInterval::custom(|n| Duration::from_millis(100 * n as u64));
    assert_eq!(linear.wait(3), Duration::from_millis(300));
  }
}
