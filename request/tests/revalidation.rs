mod common;

use common::*;
use fibre_request::{CacheStore, Platform, TimerWheelMode};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;

const FETCH: Duration = Duration::from_millis(10);

#[tokio::test(start_paused = true)]
async fn interval_refetches_until_paused() {
  let log = CallLog::default();
  let request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .refresh_interval(Duration::from_millis(1000))
    .build()
    .unwrap();
  settle().await;
  assert_eq!(log.count(), 1);

  sleep(Duration::from_millis(1050)).await;
  assert_eq!(log.count(), 2);

  request.pause(false);
  sleep(Duration::from_secs(5)).await;
  assert_eq!(log.count(), 2);

  request.resume(false);
  sleep(Duration::from_millis(1050)).await;
  assert_eq!(log.count(), 3);
  assert_eq!(request.metrics().revalidations, 2);
}

#[tokio::test(start_paused = true)]
async fn pausing_before_the_first_tick_suppresses_it() {
  let log = CallLog::default();
  let request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .refresh_interval(Duration::from_millis(1000))
    .build()
    .unwrap();

  request.pause(true);
  assert!(!request.is_active());
  assert!(!request.state().active);

  sleep(Duration::from_secs(5)).await;
  assert_eq!(log.count(), 1);
  // Pausing never aborts the call already running.
  assert!(request.data().is_some());
}

#[tokio::test(start_paused = true)]
async fn silent_pause_does_not_notify_observers() {
  let log = CallLog::default();
  let request = builder(user_service(&log, FETCH)).manual(true).build().unwrap();
  let mut state = request.subscribe();
  state.borrow_and_update();

  request.pause(false);
  assert!(!state.has_changed().unwrap());
  assert!(!request.state().active);

  request.resume(true);
  assert!(state.has_changed().unwrap());
  assert!(state.borrow_and_update().active);
}

#[tokio::test(start_paused = true)]
async fn interval_respects_visibility_and_connectivity() {
  let log = CallLog::default();
  let platform = Platform::new();
  let request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .refresh_interval(Duration::from_millis(100))
    .platform(platform.clone())
    .build()
    .unwrap();
  sleep(Duration::from_millis(50)).await;
  assert_eq!(log.count(), 1);

  platform.set_visible(false);
  sleep(Duration::from_millis(500)).await;
  assert_eq!(log.count(), 1);

  request.reconfigure(|options| options.refresh_when_hidden = true);
  sleep(Duration::from_millis(100)).await;
  assert_eq!(log.count(), 2);

  platform.set_online(false);
  sleep(Duration::from_millis(500)).await;
  assert_eq!(log.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn focus_regain_refetches_with_a_leading_throttle() {
  let log = CallLog::default();
  let platform = Platform::new();
  let _request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .refresh_on_focus(true)
    .refresh_on_focus_throttle_wait(Duration::from_secs(5))
    .platform(platform.clone())
    .build()
    .unwrap();
  settle().await;
  assert_eq!(log.count(), 1);

  platform.set_focused(false);
  platform.set_focused(true);
  settle().await;
  assert_eq!(log.count(), 2);

  // Inside the throttle window.
  platform.set_focused(false);
  platform.set_focused(true);
  settle().await;
  assert_eq!(log.count(), 2);

  sleep(Duration::from_secs(6)).await;
  platform.set_focused(false);
  platform.set_focused(true);
  settle().await;
  assert_eq!(log.count(), 3);
}

#[tokio::test(start_paused = true)]
async fn focus_is_ignored_unless_enabled() {
  let log = CallLog::default();
  let platform = Platform::new();
  let _request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .platform(platform.clone())
    .build()
    .unwrap();

  platform.set_focused(false);
  platform.set_focused(true);
  sleep(Duration::from_millis(50)).await;
  assert_eq!(log.count(), 1);
}

#[tokio::test(start_paused = true)]
async fn reconnect_refetches() {
  let log = CallLog::default();
  let platform = Platform::new();
  let _request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .refresh_on_reconnect(true)
    .platform(platform.clone())
    .build()
    .unwrap();
  settle().await;

  platform.set_online(false);
  settle().await;
  assert_eq!(log.count(), 1);

  platform.set_online(true);
  settle().await;
  assert_eq!(log.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn dependency_change_refetches_with_latest_params() {
  let log = CallLog::default();
  let (filter, filter_rx) = watch::channel("all");
  let request = builder(user_service(&log, FETCH))
    .manual(true)
    .refresh_dependency(filter_rx)
    .build()
    .unwrap();
  settle().await;
  assert_eq!(log.count(), 0);

  // No params yet: nothing to revalidate with.
  filter.send_replace("active");
  settle().await;
  assert_eq!(log.count(), 0);

  request.run_async(9).await.unwrap();
  filter.send_replace("archived");
  settle().await;
  assert_eq!(log.params(), vec![9, 9]);
}

#[tokio::test(start_paused = true)]
async fn paused_gate_ignores_event_triggers() {
  let log = CallLog::default();
  let platform = Platform::new();
  let (dependency, dependency_rx) = watch::channel(0u32);
  let request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .refresh_on_focus(true)
    .refresh_on_reconnect(true)
    .refresh_dependency(dependency_rx)
    .platform(platform.clone())
    .build()
    .unwrap();
  settle().await;
  request.pause(false);

  platform.set_focused(false);
  platform.set_focused(true);
  platform.set_online(false);
  platform.set_online(true);
  dependency.send_replace(1);
  sleep(Duration::from_millis(50)).await;
  assert_eq!(log.count(), 1);

  // Manual calls are never gated.
  request.run_async(1).await.unwrap();
  assert_eq!(log.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn expired_entry_refetches_and_keeps_stale_data() {
  let log = CallLog::default();
  let store = CacheStore::builder()
    .expiration(Duration::from_millis(500))
    .timer_mode(TimerWheelMode::HighPrecisionShortLived)
    .build()
    .unwrap();
  let request = builder(user_service(&log, Duration::from_millis(50)))
    .initial_params(1)
    .cache_key("K")
    .cache_store(store.clone())
    .build()
    .unwrap();
  until_idle(&request).await;
  assert!(store.get("K").unwrap().is_some());

  // Expires around 550ms; the refetch takes 50ms.
  sleep(Duration::from_millis(530)).await;
  assert_eq!(log.count(), 2);
  assert!(request.refreshing());
  assert_eq!(name_of(&request).as_deref(), Some("user-1"));

  until_idle(&request).await;
  assert!(store.get("K").unwrap().is_some());
}

#[tokio::test(start_paused = true)]
async fn deleted_entry_refetches_unless_paused() {
  let log = CallLog::default();
  let store = CacheStore::new();
  let request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .cache_key("K")
    .cache_store(store.clone())
    .build()
    .unwrap();
  until_idle(&request).await;

  store.delete("K").unwrap();
  settle().await;
  assert_eq!(log.count(), 2);

  until_idle(&request).await;
  request.pause(false);
  store.delete("K").unwrap();
  sleep(Duration::from_millis(50)).await;
  assert_eq!(log.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn interval_respects_refresh_when_offline() {
  let log = CallLog::default();
  let platform = Platform::new();
  let request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .refresh_interval(Duration::from_millis(100))
    .platform(platform.clone())
    .build()
    .unwrap();
  sleep(Duration::from_millis(50)).await;
  assert_eq!(log.count(), 1);

  platform.set_online(false);
  sleep(Duration::from_millis(500)).await;
  assert_eq!(log.count(), 1);

  request.reconfigure(|options| options.refresh_when_offline = true);
  sleep(Duration::from_millis(100)).await;
  assert_eq!(log.count(), 2);

  // Both policies apply together: hidden still blocks the tick.
  platform.set_visible(false);
  sleep(Duration::from_millis(500)).await;
  assert_eq!(log.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn invalidation_survives_a_burst_of_writes() {
  let log = CallLog::default();
  let store = CacheStore::new();
  let request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .cache_key("K")
    .cache_store(store.clone())
    .build()
    .unwrap();
  until_idle(&request).await;
  assert_eq!(log.count(), 1);

  // More writes than a listener mailbox holds, with no await in between, so
  // the trailing delete cannot be queued behind them.
  for version in 0..40 {
    store
      .set("K", Arc::new(User::new(1, &format!("v{version}"))), Some(1))
      .unwrap();
  }
  store.delete("K").unwrap();

  sleep(Duration::from_millis(100)).await;
  assert_eq!(log.count(), 2);
  assert_eq!(name_of(&request).as_deref(), Some("user-1"));

  // One refetch per invalidation, however many wakes follow it.
  sleep(Duration::from_millis(500)).await;
  assert_eq!(log.count(), 2);
}

#[tokio::test(start_paused = true)]
async fn each_expiration_refetches_once() {
  let log = CallLog::default();
  let store = CacheStore::builder()
    .expiration(Duration::from_millis(200))
    .timer_mode(TimerWheelMode::HighPrecisionShortLived)
    .build()
    .unwrap();
  let request = builder(user_service(&log, FETCH))
    .initial_params(1)
    .cache_key("K")
    .cache_store(store.clone())
    .build()
    .unwrap();
  until_idle(&request).await;

  // The fetch at 10ms expires near 210ms. Its refetch commits at 220ms and
  // expires near 420ms.
  sleep(Duration::from_millis(300)).await;
  assert_eq!(log.count(), 2);
  sleep(Duration::from_millis(200)).await;
  assert_eq!(log.count(), 3);
  assert_eq!(store.metrics().expirations, 2);
}
