//! Last-invocation-wins bookkeeping.
//!
//! Every call chain takes one [`Version`] when it starts. Its side effects
//! (cache write, state commit, clearing the slow flag) go through
//! [`VersionGuard::run_if_current`], so once a newer chain has started, or
//! `cancel()` advanced the guard, an older chain's completion is dropped
//! whether it succeeded or failed. Nothing is aborted: the underlying
//! operation keeps running unless it has its own abort mechanism.

use parking_lot::Mutex;

/// A token identifying one call chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Version(u64);

impl Version {
  pub fn get(self) -> u64 {
    self.0
  }
}

#[derive(Debug, Default)]
pub struct VersionGuard {
  // The check and the guarded closure run under this lock, so `next()` can
  // never slip between a chain confirming it is current and committing.
  current: Mutex<u64>,
}

impl VersionGuard {
  pub fn new() -> Self {
    Self::default()
  }

  /// Issues a fresh token and records it as current.
  pub fn next(&self) -> Version {
    let mut current = self.current.lock();
    *current += 1;
    Version(*current)
  }

  pub fn current(&self) -> Version {
    Version(*self.current.lock())
  }

  pub fn is_current(&self, version: Version) -> bool {
    *self.current.lock() == version.0
  }

  /// Runs `f` only if `version` is still current.
  ///
  /// `f` must not call back into this guard.
  pub fn run_if_current<R>(&self, version: Version, f: impl FnOnce() -> R) -> Option<R> {
    let current = self.current.lock();
    if *current == version.0 {
      Some(f())
    } else {
      None
    }
  }
}
