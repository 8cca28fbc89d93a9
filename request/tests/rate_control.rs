mod common;

use common::*;
use fibre_request::{RateOptions, RequestError};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn debounce_runs_only_the_last_call() {
  let log = CallLog::default();
  let request = builder(user_service(&log, Duration::from_millis(10)))
    .manual(true)
    .debounce(Duration::from_millis(100))
    .build()
    .unwrap();

  request.run(1);
  request.run(2);
  request.run(3);
  settle().await;
  assert_eq!(log.count(), 0);
  assert!(!request.loading());

  tokio::time::sleep(Duration::from_millis(200)).await;
  assert_eq!(log.params(), vec![3]);
  assert_eq!(name_of(&request).as_deref(), Some("user-3"));
  assert_eq!(request.metrics().rate_limited, 2);
}

#[tokio::test(start_paused = true)]
async fn throttle_reports_dropped_calls() {
  let log = CallLog::default();
  let request = builder(user_service(&log, Duration::from_millis(10)))
    .manual(true)
    .throttle(Duration::from_millis(100))
    .build()
    .unwrap();

  let (first, second, third) = tokio::join!(request.run_async(1), request.run_async(2), request.run_async(3));
  assert_eq!(first.unwrap().id, 1);
  assert!(matches!(second, Err(RequestError::RateLimited)));
  assert_eq!(third.unwrap().id, 3);
  assert_eq!(log.params(), vec![1, 3]);
}

#[tokio::test(start_paused = true)]
async fn throttle_spaces_calls_by_the_window() {
  let log = CallLog::default();
  let request = builder(user_service(&log, Duration::from_millis(10)))
    .manual(true)
    .throttle(Duration::from_millis(100))
    .build()
    .unwrap();

  let start = tokio::time::Instant::now();
  for id in 1..=5 {
    request.run(id);
    tokio::time::sleep(Duration::from_millis(30)).await;
  }
  tokio::time::sleep(Duration::from_millis(500)).await;

  let offsets: Vec<u128> = log.times().iter().map(|at| (*at - start).as_millis()).collect();
  assert_eq!(offsets.first(), Some(&0));
  for pair in offsets.windows(2) {
    assert!(pair[1] - pair[0] >= 100, "calls too close: {offsets:?}");
  }
  assert_eq!(log.params().last(), Some(&5));
}

#[tokio::test(start_paused = true)]
async fn leading_debounce_fires_immediately() {
  let log = CallLog::default();
  let request = builder(user_service(&log, Duration::from_millis(10)))
    .manual(true)
    .debounce(RateOptions::debounce(Duration::from_millis(100)).leading(true).trailing(false))
    .build()
    .unwrap();

  request.run(1);
  request.run(2);
  settle().await;
  assert_eq!(log.params(), vec![1]);

  tokio::time::sleep(Duration::from_millis(300)).await;
  assert_eq!(log.params(), vec![1]);
}

#[tokio::test(start_paused = true)]
async fn background_triggers_bypass_rate_control() {
  let log = CallLog::default();
  let request = builder(user_service(&log, Duration::from_millis(10)))
    .initial_params(1)
    .throttle(Duration::from_secs(10))
    .refresh_interval(Duration::from_millis(100))
    .build()
    .unwrap();

  tokio::time::sleep(Duration::from_millis(250)).await;
  assert_eq!(log.count(), 3);
  assert_eq!(request.metrics().rate_limited, 0);
}

#[tokio::test(start_paused = true)]
async fn cancel_drops_pending_calls() {
  let log = CallLog::default();
  let request = builder(user_service(&log, Duration::from_millis(10)))
    .manual(true)
    .debounce(Duration::from_millis(100))
    .build()
    .unwrap();

  let pending = {
    let request = request.clone();
    tokio::spawn(async move { request.run_async(7).await })
  };
  settle().await;
  request.cancel();

  let outcome = pending.await.unwrap();
  assert!(matches!(outcome, Err(RequestError::RateLimited)));
  tokio::time::sleep(Duration::from_millis(300)).await;
  assert_eq!(log.count(), 0);
}

#[tokio::test(start_paused = true)]
async fn reconfigured_debounce_takes_effect() {
  let log = CallLog::default();
  let request = builder(user_service(&log, Duration::from_millis(10)))
    .manual(true)
    .build()
    .unwrap();

  request.run(1);
  settle().await;
  assert_eq!(log.count(), 1);

  request.reconfigure(|options| options.debounce = Some(RateOptions::debounce(Duration::from_millis(100))));
  request.run(2);
  request.run(3);
  tokio::time::sleep(Duration::from_millis(200)).await;
  assert_eq!(log.params(), vec![1, 3]);
}
