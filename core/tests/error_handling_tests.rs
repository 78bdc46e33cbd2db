// tests/error_handling_tests.rs
mod common;

use catena::{CatenaError, Collector, Operation, WorkFailure};
use common::*;
use parking_lot::Mutex;
use serial_test::serial;
use std::sync::{atomic::Ordering, Arc};
use std::time::Duration;

#[tokio::test]
#[serial]
async fn test_independent_group_failure_does_not_reach_successor() {
  setup_tracing();
  let session = session();

  let group = session.operation_group::<i32, i32>().unwrap();
  group.independent().unwrap();
  assert!(group.is_independent());
  let op = group.local_operation().unwrap();
  op.on_execution(|_ctx| Err(WorkFailure::new("member exploded").into())).unwrap();
  op.submit().unwrap();
  let group_submission = group.submit().unwrap();
  group.close().unwrap();

  let successor = session.local_operation::<i32>().unwrap();
  successor.on_execution(|_ctx| Ok(42)).unwrap();
  let successor = successor.submit().unwrap();

  assert_eq!(successor.await.unwrap(), 42);
  // The group's own handle still reports what happened.
  let err = group_submission.await.unwrap_err();
  assert_eq!(err.work_failure().map(|f| f.message.as_str()), Some("member exploded"));
}

#[tokio::test]
#[serial]
async fn test_dependent_group_failure_skips_successor() {
  setup_tracing();
  reset_counters();
  let session = session();

  let group = session.operation_group::<i32, i32>().unwrap();
  let op = group.local_operation().unwrap();
  op.on_execution(|_ctx| Err(WorkFailure::new("member exploded").into())).unwrap();
  op.submit().unwrap();
  group.submit().unwrap();
  group.close().unwrap();

  let successor = session.local_operation::<i32>().unwrap();
  successor
    .on_execution(|_ctx| {
      ACTION_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
      Ok(42)
    })
    .unwrap();
  let err = successor.submit().unwrap().await.unwrap_err();
  assert!(matches!(err, CatenaError::Execution(_)));
  assert_eq!(actions_run(), 0);
}

#[tokio::test]
#[serial]
async fn test_catch_member_runs_after_failure_and_observes_it() {
  setup_tracing();
  let session = session();
  let observed: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

  let group = session.operation_group::<i32, i32>().unwrap();
  group.collect(Collector::last()).unwrap();

  let failing = group.local_operation().unwrap();
  failing.on_execution(|_ctx| Err(WorkFailure::new("disk full").into())).unwrap();
  failing.submit().unwrap();

  let catch = group.catch_operation().unwrap();
  let seen = observed.clone();
  catch
    .on_error(move |err: &CatenaError| seen.lock().push(err.to_string()))
    .unwrap();
  let caught = catch.submit().unwrap();

  let recovered = group.local_operation().unwrap();
  recovered.on_execution(|_ctx| Ok(7)).unwrap();
  recovered.submit().unwrap();

  let submission = group.submit().unwrap();
  group.close().unwrap();

  assert_eq!(caught.await.unwrap(), 0);
  assert_eq!(submission.await.unwrap(), Some(7));
  let observed = observed.lock().clone();
  assert_eq!(observed.len(), 1);
  assert!(observed[0].contains("disk full"));
}

#[tokio::test]
#[serial]
async fn test_error_handler_observes_without_suppressing() {
  setup_tracing();
  reset_counters();
  let session = session();

  let op = session.local_operation::<()>().unwrap();
  op.on_error(|err: &CatenaError| {
    assert!(matches!(err, CatenaError::Execution(_)));
    ERROR_HANDLER_COUNTER.fetch_add(1, Ordering::SeqCst);
  })
  .unwrap()
  .on_execution(|_ctx| Err(anyhow::anyhow!("remote service refused").into()))
  .unwrap();

  let err = op.submit().unwrap().await.unwrap_err();
  assert_eq!(err.work_failure().map(|f| f.message.as_str()), Some("remote service refused"));
  assert_eq!(ERROR_HANDLER_COUNTER.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[serial]
async fn test_driver_failure_keeps_diagnostics() {
  setup_tracing();
  let driver = RecordingDriver::new();
  driver.fail_on(
    "INSERT INTO accounts VALUES (:id)",
    WorkFailure::new("duplicate key")
      .with_sql_state("23505")
      .with_vendor_code(1)
      .with_position(27),
  );
  let session = session_with(&driver);

  let op = session.operation::<u64>("INSERT INTO accounts VALUES (:id)").unwrap();
  op.set("id", 1).unwrap().apply(|outcome| Ok(outcome.row_count)).unwrap();
  let err = op.submit().unwrap().await.unwrap_err();

  let failure = err.work_failure().expect("execution failure");
  assert_eq!(failure.message, "duplicate key");
  assert_eq!(failure.sql_state.as_deref(), Some("23505"));
  assert_eq!(failure.vendor_code, 1);
  assert_eq!(failure.position, 27);
  // The statement text is filled in when the driver left it out.
  assert_eq!(failure.sql.as_deref(), Some("INSERT INTO accounts VALUES (:id)"));
}

#[tokio::test]
#[serial]
async fn test_operation_timeout_fails_with_timeout() {
  setup_tracing();
  let session = session();

  let op = session.local_operation::<()>().unwrap();
  op.timeout(Duration::from_millis(20))
    .unwrap()
    .on_execution(|_ctx| {
      std::thread::sleep(Duration::from_millis(150));
      Ok(())
    })
    .unwrap();
  let err = op.submit().unwrap().await.unwrap_err();
  assert!(matches!(err, CatenaError::Timeout { .. }));
}

#[tokio::test]
#[serial]
async fn test_default_timeout_comes_from_session_config() {
  setup_tracing();
  let session = catena::Session::builder()
    .default_timeout(Duration::from_millis(20))
    .build()
    .unwrap();

  let op = session.local_operation::<()>().unwrap();
  op.on_execution(|_ctx| {
    std::thread::sleep(Duration::from_millis(150));
    Ok(())
  })
  .unwrap();
  assert!(matches!(op.submit().unwrap().await, Err(CatenaError::Timeout { .. })));
}

#[tokio::test]
#[serial]
async fn test_group_error_handler_sees_member_failure() {
  setup_tracing();
  reset_counters();
  let session = session();

  let group = session.operation_group::<(), ()>().unwrap();
  group
    .on_error(|_err: &CatenaError| {
      ERROR_HANDLER_COUNTER.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
  let op = group.local_operation().unwrap();
  op.on_execution(|_ctx| Err(WorkFailure::new("nope").into())).unwrap();
  op.submit().unwrap();
  let submission = group.submit().unwrap();
  group.close().unwrap();

  assert!(submission.await.is_err());
  assert_eq!(ERROR_HANDLER_COUNTER.load(Ordering::SeqCst), 1);
}

#[tokio::test]
#[serial]
async fn test_failed_predecessor_cancels_group_catch_members() {
  setup_tracing();
  reset_counters();
  let session = session();

  let failing = session.local_operation::<()>().unwrap();
  failing.on_execution(|_ctx| Err(WorkFailure::new("boom").into())).unwrap();
  failing.submit().unwrap();

  let group = session.operation_group::<i32, i32>().unwrap();
  let catch = group.catch_operation().unwrap();
  catch
    .on_error(|_err: &CatenaError| {
      ERROR_HANDLER_COUNTER.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
  let caught = catch.submit().unwrap();
  let submission = group.submit().unwrap();

  // The group gives up without waiting to be closed.
  let err = submission.await.unwrap_err();
  assert_eq!(err.work_failure().map(|f| f.message.as_str()), Some("boom"));
  assert!(caught.await.unwrap_err().is_skip());
  assert_eq!(catch.lifecycle(), catena::OperationLifecycle::Canceled);

  // Members added after the group gave up are canceled too.
  let late = group.catch_operation().unwrap();
  let late_outcome = late.submit().unwrap();
  group.close().unwrap();
  assert!(late_outcome.await.unwrap_err().is_skip());
  assert_eq!(ERROR_HANDLER_COUNTER.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[serial]
async fn test_independent_nested_group_failure_does_not_reach_parent_successor() {
  setup_tracing();
  let session = session();

  let parent = session.operation_group::<i32, Vec<i32>>().unwrap();
  parent.collect(Collector::to_vec()).unwrap();

  let nested = parent.operation_group::<i32>().unwrap();
  nested.independent().unwrap();
  let op = nested.local_operation().unwrap();
  op.on_execution(|_ctx| Err(WorkFailure::new("inner failure").into())).unwrap();
  op.submit().unwrap();
  let nested_submission = nested.submit().unwrap();
  nested.close().unwrap();

  let after = parent.local_operation().unwrap();
  after.on_execution(|_ctx| Ok(5)).unwrap();
  let after = after.submit().unwrap();

  let parent_submission = parent.submit().unwrap();
  parent.close().unwrap();

  assert_eq!(after.await.unwrap(), 5);
  // The failed group contributes nothing to the parent's result.
  assert_eq!(parent_submission.await.unwrap(), Some(vec![5]));
  let err = nested_submission.await.unwrap_err();
  assert_eq!(err.work_failure().map(|f| f.message.as_str()), Some("inner failure"));
}

#[tokio::test]
#[serial]
async fn test_independent_group_still_notifies_its_error_handler() {
  setup_tracing();
  reset_counters();
  let session = session();

  let group = session.operation_group::<(), ()>().unwrap();
  group.independent().unwrap();
  group
    .on_error(|err: &CatenaError| {
      assert_eq!(err.work_failure().map(|f| f.message.as_str()), Some("nope"));
      ERROR_HANDLER_COUNTER.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
  let op = group.local_operation().unwrap();
  op.on_execution(|_ctx| Err(WorkFailure::new("nope").into())).unwrap();
  op.submit().unwrap();
  let group_submission = group.submit().unwrap();
  group.close().unwrap();

  let successor = session.local_operation::<i32>().unwrap();
  successor.on_execution(|_ctx| Ok(1)).unwrap();
  assert_eq!(successor.submit().unwrap().await.unwrap(), 1);

  assert!(group_submission.await.is_err());
  assert_eq!(ERROR_HANDLER_COUNTER.load(Ordering::SeqCst), 1);
}
