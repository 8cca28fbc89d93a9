//! The host signals revalidation depends on: visibility, focus and
//! connectivity.
//!
//! A host wires its real sources (window events, network monitors) into a
//! [`Platform`] with the `set_*` methods. Only transitions are broadcast;
//! setting a flag to the value it already has is a no-op.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::broadcast;

/// A change in one of the platform signals.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
  FocusGained,
  FocusLost,
  Visible,
  Hidden,
  Online,
  Offline,
}

impl fmt::Display for PlatformEvent {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      PlatformEvent::FocusGained => "focus gained",
      PlatformEvent::FocusLost => "focus lost",
      PlatformEvent::Visible => "visible",
      PlatformEvent::Hidden => "hidden",
      PlatformEvent::Online => "online",
      PlatformEvent::Offline => "offline",
    };
    f.write_str(name)
  }
}

const EVENT_CHANNEL_CAPACITY: usize = 64;

struct PlatformInner {
  visible: AtomicBool,
  focused: AtomicBool,
  online: AtomicBool,
  events: broadcast::Sender<PlatformEvent>,
}

/// A cheaply cloneable handle to the host's visibility, focus and
/// connectivity state. Starts visible, focused and online.
#[derive(Clone)]
pub struct Platform {
  inner: Arc<PlatformInner>,
}

impl Platform {
  pub fn new() -> Self {
    let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self {
      inner: Arc::new(PlatformInner {
        visible: AtomicBool::new(true),
        focused: AtomicBool::new(true),
        online: AtomicBool::new(true),
        events,
      }),
    }
  }

  pub fn is_visible(&self) -> bool {
    self.inner.visible.load(Ordering::Acquire)
  }

  pub fn is_focused(&self) -> bool {
    self.inner.focused.load(Ordering::Acquire)
  }

  pub fn is_online(&self) -> bool {
    self.inner.online.load(Ordering::Acquire)
  }

  pub fn set_visible(&self, visible: bool) {
    let event = if visible {
      PlatformEvent::Visible
    } else {
      PlatformEvent::Hidden
    };
    self.transition(&self.inner.visible, visible, event);
  }

  pub fn set_focused(&self, focused: bool) {
    let event = if focused {
      PlatformEvent::FocusGained
    } else {
      PlatformEvent::FocusLost
    };
    self.transition(&self.inner.focused, focused, event);
  }

  pub fn set_online(&self, online: bool) {
    let event = if online {
      PlatformEvent::Online
    } else {
      PlatformEvent::Offline
    };
    self.transition(&self.inner.online, online, event);
  }

  /// Subscribes to future transitions.
  pub fn subscribe(&self) -> broadcast::Receiver<PlatformEvent> {
    self.inner.events.subscribe()
  }

  fn transition(&self, flag: &AtomicBool, value: bool, event: PlatformEvent) {
    if flag.swap(value, Ordering::AcqRel) != value {
      tracing::trace!(event = %event, "platform transition");
      // No receivers is fine: nothing is listening yet.
      let _ = self.inner.events.send(event);
    }
  }
}

impl Default for Platform {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Platform {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Platform")
      .field("visible", &self.is_visible())
      .field("focused", &self.is_focused())
      .field("online", &self.is_online())
      .finish()
  }
}
