#![allow(dead_code)]

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use fibre_request::{CacheEntry, CacheError, CacheProvider, MemoryProvider, Request, RequestBuilder};
use futures_util::future::BoxFuture;
use parking_lot::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
  pub id: u32,
  pub name: String,
}

impl User {
  pub fn new(id: u32, name: &str) -> Self {
    Self {
      id,
      name: name.to_string(),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError(pub String);

impl fmt::Display for FetchError {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

pub type UserRequest = Request<u32, User, FetchError>;
pub type UserService = Arc<dyn Fn(u32) -> BoxFuture<'static, Result<User, FetchError>> + Send + Sync>;

// Records every call a service receives, with the (paused) time it started.
#[derive(Clone, Default)]
pub struct CallLog {
  calls: Arc<Mutex<Vec<(u32, Instant)>>>,
}

impl CallLog {
  pub fn record(&self, id: u32) {
    self.calls.lock().push((id, Instant::now()));
  }

  pub fn count(&self) -> usize {
    self.calls.lock().len()
  }

  pub fn params(&self) -> Vec<u32> {
    self.calls.lock().iter().map(|(id, _)| *id).collect()
  }

  pub fn times(&self) -> Vec<Instant> {
    self.calls.lock().iter().map(|(_, at)| *at).collect()
  }
}

/// A service that resolves `User { id, name: "user-{id}" }` after `delay`.
pub fn user_service(log: &CallLog, delay: Duration) -> UserService {
  delayed_service(log, move |_| delay)
}

/// Like `user_service`, with a per-param delay.
pub fn delayed_service(log: &CallLog, delay: impl Fn(u32) -> Duration + Send + Sync + 'static) -> UserService {
  let log = log.clone();
  Arc::new(move |id| {
    log.record(id);
    let delay = delay(id);
    Box::pin(async move {
      tokio::time::sleep(delay).await;
      Ok(User::new(id, &format!("user-{id}")))
    })
  })
}

/// A service that always fails after `delay`, numbering its failures.
pub fn failing_service(log: &CallLog, delay: Duration) -> UserService {
  let log = log.clone();
  Arc::new(move |id| {
    log.record(id);
    let attempt = log.count();
    Box::pin(async move {
      tokio::time::sleep(delay).await;
      Err(FetchError(format!("fail #{attempt}")))
    })
  })
}

pub fn builder(service: UserService) -> RequestBuilder<u32, User, FetchError> {
  Request::builder(move |id| service(id))
}

/// Waits until the request is no longer loading.
pub async fn until_idle(request: &UserRequest) {
  let mut state = request.subscribe();
  state
    .wait_for(|state| !state.loading)
    .await
    .expect("state channel closed");
}

/// Lets spawned tasks run without moving the paused clock meaningfully.
pub async fn settle() {
  tokio::time::sleep(Duration::from_millis(1)).await;
}

pub fn name_of(request: &UserRequest) -> Option<String> {
  request.data().map(|user| user.name.clone())
}

/// A memory provider whose writes can be switched to fail.
#[derive(Clone, Default)]
pub struct FlakyProvider {
  inner: Arc<MemoryProvider<u32, User>>,
  fail_writes: Arc<AtomicBool>,
}

impl FlakyProvider {
  pub fn fail_writes(&self, fail: bool) {
    self.fail_writes.store(fail, Ordering::SeqCst);
  }
}

impl CacheProvider<u32, User> for FlakyProvider {
  fn get(&self, key: &str) -> Result<Option<CacheEntry<u32, User>>, CacheError> {
    self.inner.get(key)
  }

  fn set(&self, key: &str, entry: CacheEntry<u32, User>) -> Result<(), CacheError> {
    if self.fail_writes.load(Ordering::SeqCst) {
      return Err(CacheError::Unavailable(format!("write to {key} refused")));
    }
    self.inner.set(key, entry)
  }

  fn delete(&self, key: &str) -> Result<(), CacheError> {
    self.inner.delete(key)
  }

  fn keys(&self) -> Result<Vec<String>, CacheError> {
    self.inner.keys()
  }
}
