//! Cache-backed request synchronization for async Rust clients.
//!
//! A [`Request`] wraps a caller-supplied async operation and keeps its visible
//! state (`data`, `error`, `loading`, `loading_slow`) consistent no matter how
//! many triggers fire at once.
//!
//! # Features
//! - **Last call wins**: every invocation takes a fresh version token, and
//!   only the newest one may commit. Older completions are dropped, in
//!   whatever order they arrive.
//! - **Retry with backoff**: bounded retries with capped exponential, fixed
//!   or custom waits.
//! - **Stale-while-revalidate**: a shared [`CacheStore`] seeds data before the
//!   first fetch, and every request on a key sees writes to it.
//! - **Background revalidation**: fixed interval, focus regained, reconnect
//!   and dependency changes, all pausable.
//! - **Slow-load detection** and **throttle/debounce** for manual calls.
//! - **Persistence**: optional `serde` feature for saving and restoring a
//!   cache store.
//!
//! Nothing here preempts the wrapped operation. `cancel()` only suppresses
//! the effects of calls already in flight.

// Public modules that form the API
pub mod builder;
pub mod error;
pub mod guard;
pub mod metrics;
pub mod options;
pub mod platform;
pub mod rate;
pub mod request;
pub mod retry;
pub mod state;
pub mod store;

// Internal, crate-only modules
mod gate;
mod runtime;
mod scheduler;
mod slow;

// Re-export the primary user-facing types for convenience
pub use builder::{RequestBuilder, ThrottleOptions};
pub use error::{BuildError, CacheError, RequestError};
pub use metrics::{MetricsSnapshot, StoreMetricsSnapshot};
pub use options::{Callbacks, CacheKey, RequestOptions};
pub use platform::{Platform, PlatformEvent};
pub use rate::RateOptions;
pub use request::Request;
pub use retry::{RetryInterval, RetryPolicy};
pub use state::RequestState;
pub use store::{
  CacheEntry, CacheEvent, CacheProvider, CacheStore, CacheStoreBuilder, CacheSubscription, KeyFilter,
  MemoryProvider, Mutation, TimerWheelMode,
};
#[cfg(feature = "serde")]
pub use store::CacheSnapshot;
