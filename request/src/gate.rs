use std::sync::atomic::{AtomicBool, Ordering};

/// The active/inactive switch for scheduled revalidation.
///
/// While inactive, the interval timer is stopped and event-driven triggers
/// (focus, reconnect, dependency change, cache invalidation) are ignored.
/// Manual calls and in-flight chains are never affected.
#[derive(Debug)]
pub struct PausableGate {
  active: AtomicBool,
}

impl PausableGate {
  pub fn new(active: bool) -> Self {
    Self {
      active: AtomicBool::new(active),
    }
  }

  #[inline]
  pub fn is_active(&self) -> bool {
    self.active.load(Ordering::Acquire)
  }

  /// Marks the gate inactive. Returns `true` if it was active before.
  pub fn pause(&self) -> bool {
    self.active.swap(false, Ordering::AcqRel)
  }

  /// Marks the gate active. Returns `true` if it was inactive before.
  pub fn resume(&self) -> bool {
    !self.active.swap(true, Ordering::AcqRel)
  }
}

impl Default for PausableGate {
  fn default() -> Self {
    Self::new(true)
  }
}
