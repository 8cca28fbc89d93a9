mod common;

use common::*;
use fibre_request::{RequestError, RetryInterval};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn exhausts_after_count_plus_one_attempts() {
  let log = CallLog::default();
  let retry_failed = Arc::new(AtomicUsize::new(0));
  let errors = Arc::new(AtomicUsize::new(0));
  let retries = Arc::new(Mutex::new(Vec::new()));

  let request = {
    let retry_failed = Arc::clone(&retry_failed);
    let errors = Arc::clone(&errors);
    let retries = Arc::clone(&retries);
    builder(failing_service(&log, Duration::from_millis(10)))
      .manual(true)
      .error_retry_count(2)
      .on_error(move |_, _| {
        errors.fetch_add(1, Ordering::SeqCst);
      })
      .on_error_retry(move |_, attempt| retries.lock().push(attempt))
      .on_retry_failed(move |_| {
        retry_failed.fetch_add(1, Ordering::SeqCst);
      })
      .build()
      .unwrap()
  };

  let result = request.run_async(1).await;

  let error = match result {
    Err(RequestError::Fetch(error)) => error,
    other => panic!("expected a fetch error, got {other:?}"),
  };
  assert_eq!(error.0, "fail #3");
  assert_eq!(log.count(), 3);

  // Waits of interval(1) = 1s and interval(2) = 2s, each after a 10ms attempt.
  let times = log.times();
  assert_eq!(times[1] - times[0], Duration::from_millis(1010));
  assert_eq!(times[2] - times[1], Duration::from_millis(2010));

  assert_eq!(errors.load(Ordering::SeqCst), 3);
  assert_eq!(*retries.lock(), vec![1, 2]);
  assert_eq!(retry_failed.load(Ordering::SeqCst), 1);
  assert_eq!(request.error().map(|e| e.0.clone()).as_deref(), Some("fail #3"));
  assert!(!request.loading());

  let metrics = request.metrics();
  assert_eq!(metrics.retries, 2);
  assert_eq!(metrics.failures, 1);
  assert_eq!(metrics.invocations, 1);
}

#[tokio::test(start_paused = true)]
async fn loading_stays_true_between_retries() {
  let log = CallLog::default();
  let request = builder(failing_service(&log, Duration::from_millis(10)))
    .initial_params(1)
    .error_retry_count(1)
    .error_retry_interval(Duration::from_millis(500))
    .build()
    .unwrap();

  tokio::time::sleep(Duration::from_millis(100)).await;
  assert_eq!(log.count(), 1);
  assert!(request.loading());
  assert!(request.error().is_none());

  until_idle(&request).await;
  assert_eq!(log.count(), 2);
  assert!(request.error().is_some());
}

#[tokio::test(start_paused = true)]
async fn stale_data_survives_a_failed_refresh() {
  let log = CallLog::default();
  let failing = Arc::new(AtomicBool::new(false));
  let ok = user_service(&log, Duration::from_millis(10));
  let err = failing_service(&log, Duration::from_millis(10));
  let service: UserService = {
    let failing = Arc::clone(&failing);
    Arc::new(move |id| {
      if failing.load(Ordering::SeqCst) {
        err(id)
      } else {
        ok(id)
      }
    })
  };

  let request = builder(service).initial_params(1).build().unwrap();
  until_idle(&request).await;
  assert_eq!(name_of(&request).as_deref(), Some("user-1"));

  failing.store(true, Ordering::SeqCst);
  let result = request.refresh_async().await;
  assert!(result.unwrap_err().fetch_error().is_some());

  // Stale data next to the error.
  assert_eq!(name_of(&request).as_deref(), Some("user-1"));
  assert!(request.error().is_some());

  // The next success clears the error.
  failing.store(false, Ordering::SeqCst);
  request.refresh_async().await.unwrap();
  assert!(request.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn recovers_on_retry_with_a_custom_interval() {
  let log = CallLog::default();
  let ok = user_service(&log, Duration::from_millis(10));
  let err = failing_service(&log, Duration::from_millis(10));
  let counter = Arc::new(AtomicUsize::new(0));
  let service: UserService = Arc::new(move |id| {
    if counter.fetch_add(1, Ordering::SeqCst) == 0 {
      err(id)
    } else {
      ok(id)
    }
  });

  let request = builder(service)
    .manual(true)
    .error_retry_count(3)
    .error_retry_interval(RetryInterval::custom(|attempt| Duration::from_millis(100 * attempt as u64)))
    .build()
    .unwrap();

  let user = request.run_async(4).await.unwrap();
  assert_eq!(user.id, 4);
  assert_eq!(log.count(), 2);
  let times = log.times();
  assert_eq!(times[1] - times[0], Duration::from_millis(110));
  assert!(request.error().is_none());
  assert_eq!(request.metrics().retries, 1);
}

#[tokio::test(start_paused = true)]
async fn a_newer_call_stops_the_retry_chain() {
  let log = CallLog::default();
  let request = builder(failing_service(&log, Duration::from_millis(10)))
    .manual(true)
    .error_retry_count(5)
    .error_retry_interval(Duration::from_secs(1))
    .build()
    .unwrap();

  request.run(1);
  tokio::time::sleep(Duration::from_millis(500)).await;
  assert_eq!(log.count(), 1);

  request.cancel();
  tokio::time::sleep(Duration::from_secs(10)).await;
  assert_eq!(log.count(), 1);
  assert!(request.error().is_none());
}

#[tokio::test(start_paused = true)]
async fn retry_failed_callback_sees_the_committed_error() {
  let log = CallLog::default();
  let request = builder(failing_service(&log, Duration::from_millis(10)))
    .manual(true)
    .error_retry_count(1)
    .error_retry_interval(Duration::from_millis(100))
    .build()
    .unwrap();

  let observed = Arc::new(Mutex::new(Vec::new()));
  let state = request.subscribe();
  let seen = Arc::clone(&observed);
  request.reconfigure(move |options| {
    options.callbacks.on_retry_failed = Some(Arc::new(move |_: &FetchError| {
      let state = state.borrow();
      seen.lock().push((state.error.is_some(), state.loading));
    }));
  });

  assert!(request.run_async(1).await.is_err());
  assert_eq!(*observed.lock(), vec![(true, false)]);
}
