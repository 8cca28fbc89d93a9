use fibre_request::{CacheSnapshot, CacheStore, TimerWheelMode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Profile {
  handle: String,
  followers: u64,
}

fn profile(handle: &str, followers: u64) -> Arc<Profile> {
  Arc::new(Profile {
    handle: handle.to_string(),
    followers,
  })
}

fn round_trip(snapshot: &CacheSnapshot<u32, Profile>) -> CacheSnapshot<u32, Profile> {
  let bytes = bincode::serialize(snapshot).unwrap();
  bincode::deserialize(&bytes).unwrap()
}

#[tokio::test(start_paused = true)]
async fn snapshot_restores_entries_and_params() {
  let store: CacheStore<u32, Profile> = CacheStore::new();
  store.set("profile:1", profile("ada", 10), Some(1)).unwrap();
  store.set("profile:2", profile("bob", 20), None).unwrap();

  let snapshot = round_trip(&store.to_snapshot().unwrap());
  assert_eq!(snapshot.len(), 2);

  let restored = CacheStore::<u32, Profile>::builder().build_from_snapshot(snapshot).unwrap();
  let ada = restored.get("profile:1").unwrap().unwrap();
  assert_eq!(ada.data.handle, "ada");
  assert_eq!(ada.params, Some(1));
  let bob = restored.get("profile:2").unwrap().unwrap();
  assert_eq!(bob.data.followers, 20);
  assert_eq!(bob.params, None);

  let mut keys = restored.keys().unwrap();
  keys.sort();
  assert_eq!(keys, vec!["profile:1".to_string(), "profile:2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn restored_entries_keep_their_remaining_ttl() {
  let store: CacheStore<u32, Profile> = CacheStore::builder()
    .expiration(Duration::from_secs(1))
    .timer_mode(TimerWheelMode::HighPrecisionShortLived)
    .build()
    .unwrap();
  store.set("profile:1", profile("ada", 10), Some(1)).unwrap();
  tokio::time::sleep(Duration::from_millis(400)).await;

  let snapshot = round_trip(&store.to_snapshot().unwrap());
  drop(store);

  let restored = CacheStore::<u32, Profile>::builder()
    .expiration(Duration::from_secs(1))
    .timer_mode(TimerWheelMode::HighPrecisionShortLived)
    .build_from_snapshot(snapshot)
    .unwrap();

  tokio::time::sleep(Duration::from_millis(400)).await;
  assert!(restored.get("profile:1").unwrap().is_some());

  tokio::time::sleep(Duration::from_millis(400)).await;
  assert!(restored.get("profile:1").unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn expired_entries_are_left_out() {
  let store: CacheStore<u32, Profile> = CacheStore::builder()
    .expiration(Duration::from_millis(100))
    .timer_mode(TimerWheelMode::HighPrecisionShortLived)
    .build()
    .unwrap();
  store.set("short", profile("ada", 1), None).unwrap();
  tokio::time::sleep(Duration::from_millis(300)).await;
  store.set("fresh", profile("bob", 2), None).unwrap();

  let snapshot = store.to_snapshot().unwrap();
  assert_eq!(snapshot.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn store_without_expiration_restores_without_ttl() {
  let store: CacheStore<u32, Profile> = CacheStore::builder()
    .expiration(Duration::from_millis(500))
    .timer_mode(TimerWheelMode::HighPrecisionShortLived)
    .build()
    .unwrap();
  store.set("profile:1", profile("ada", 10), None).unwrap();
  let snapshot = round_trip(&store.to_snapshot().unwrap());

  let restored = CacheStore::<u32, Profile>::builder().build_from_snapshot(snapshot).unwrap();
  tokio::time::sleep(Duration::from_secs(5)).await;
  assert!(restored.get("profile:1").unwrap().is_some());
}
