// tests/lifecycle_tests.rs
mod common;

use catena::{
  CatenaError, Collector, FreezeCause, GroupPhase, Operation, OperationLifecycle, Session, TransactionOutcome,
};
use common::*;
use serial_test::serial;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[tokio::test]
#[serial]
async fn test_cancel_before_turn_prevents_action() {
  setup_tracing();
  reset_counters();
  let session = session();

  let group = session.operation_group::<(), ()>().unwrap();
  let op = group.local_operation().unwrap();
  op.on_execution(|_ctx| {
    ACTION_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
    Ok(())
  })
  .unwrap();
  let member = op.submit().unwrap();

  assert!(member.cancel());
  assert_eq!(op.lifecycle(), OperationLifecycle::Canceled);

  let submission = group.submit().unwrap();
  group.close().unwrap();

  assert!(member.await.unwrap_err().is_skip());
  // The skip fails the group like any other member failure.
  assert!(submission.await.unwrap_err().is_skip());
  assert_eq!(actions_run(), 0);
}

#[tokio::test]
#[serial]
async fn test_cancel_after_completion_is_no_op() {
  setup_tracing();
  let session = session();

  let op = session.local_operation::<i32>().unwrap();
  op.on_execution(|_ctx| Ok(3)).unwrap();
  let submission = op.submit().unwrap();
  assert_eq!(submission.outcome().await.unwrap(), 3);

  assert!(!op.cancel());
  assert_eq!(op.lifecycle(), OperationLifecycle::Completed);
  assert_eq!(submission.peek().map(|o| o.ok()), Some(Some(3)));
}

#[tokio::test]
#[serial]
async fn test_canceled_group_skips_members() {
  setup_tracing();
  reset_counters();
  let session = session();

  let group = session.operation_group::<(), ()>().unwrap();
  let op = group.local_operation().unwrap();
  op.on_execution(|_ctx| {
    ACTION_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
    Ok(())
  })
  .unwrap();
  let member = op.submit().unwrap();

  // Keep the session busy so the group is still waiting for its turn.
  let blocker = session.local_operation::<()>().unwrap();
  blocker
    .on_execution(|_ctx| {
      std::thread::sleep(Duration::from_millis(50));
      Ok(())
    })
    .unwrap();
  blocker.submit().unwrap();

  let submission = group.submit().unwrap();
  assert!(group.cancel());
  group.close().unwrap();

  assert!(submission.await.unwrap_err().is_skip());
  assert!(member.await.unwrap_err().is_skip());
  assert_eq!(actions_run(), 0);
}

#[tokio::test]
#[serial]
async fn test_canceled_group_skips_catch_members() {
  setup_tracing();
  reset_counters();
  let session = session();

  let group = session.operation_group::<i32, i32>().unwrap();
  let catch = group.catch_operation().unwrap();
  catch
    .on_error(|_err: &CatenaError| {
      ERROR_HANDLER_COUNTER.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
  let caught = catch.submit().unwrap();

  let blocker = session.local_operation::<()>().unwrap();
  blocker
    .on_execution(|_ctx| {
      std::thread::sleep(Duration::from_millis(50));
      Ok(())
    })
    .unwrap();
  blocker.submit().unwrap();

  // Canceled through its handle, so the group only notices when its turn comes.
  let submission = group.submit().unwrap();
  assert!(submission.cancel());
  group.close().unwrap();

  assert!(submission.await.unwrap_err().is_skip());
  assert!(caught.await.unwrap_err().is_skip());
  assert_eq!(catch.lifecycle(), OperationLifecycle::Canceled);
  assert_eq!(ERROR_HANDLER_COUNTER.load(Ordering::SeqCst), 0);
}

#[tokio::test]
#[serial]
async fn test_group_canceled_before_submit_settles_members() {
  setup_tracing();
  reset_counters();
  let session = session();

  let group = session.operation_group::<(), ()>().unwrap();
  let op = group.local_operation().unwrap();
  op.on_execution(|_ctx| {
    ACTION_EXEC_COUNTER.fetch_add(1, Ordering::SeqCst);
    Ok(())
  })
  .unwrap();
  let member = op.submit().unwrap();

  assert!(group.cancel());
  assert_eq!(group.lifecycle(), OperationLifecycle::Canceled);
  assert!(matches!(group.submit(), Err(CatenaError::IllegalState(_))));

  assert!(!pending_after(member.outcome(), Duration::from_millis(300)).await);
  assert!(member.await.unwrap_err().is_skip());
  assert_eq!(op.lifecycle(), OperationLifecycle::Canceled);
  assert_eq!(actions_run(), 0);
}

#[tokio::test]
#[serial]
async fn test_rejected_submit_changes_nothing() {
  setup_tracing();
  let session = session();

  let group = session.operation_group::<i32, i32>().unwrap();
  let op = session.local_operation::<i32>().unwrap();
  op.on_execution(|_ctx| Ok(1)).unwrap();
  session.close().unwrap();

  assert!(matches!(group.submit(), Err(CatenaError::IllegalState(_))));
  assert_eq!(group.lifecycle(), OperationLifecycle::New);
  assert_eq!(group.phase(), GroupPhase::Configuring);
  group.parallel().unwrap();

  assert!(matches!(op.submit(), Err(CatenaError::IllegalState(_))));
  assert_eq!(op.lifecycle(), OperationLifecycle::New);
  assert!(format!("{:?}", op).contains("action_present: true"));
}

#[tokio::test]
#[serial]
async fn test_fixed_action_operations_reject_on_execution() {
  setup_tracing();
  let session = session();

  let catch = session.catch_operation::<i32>().unwrap();
  assert!(matches!(catch.on_execution(|_ctx| Ok(5)), Err(CatenaError::IllegalState(_))));

  let transaction = session.transaction_completion();
  let end = session
    .end_transaction_operation::<TransactionOutcome>(&transaction)
    .unwrap();
  assert!(matches!(
    end.on_execution(|_ctx| Ok(TransactionOutcome::Committed)),
    Err(CatenaError::IllegalState(_))
  ));

  // The catch keeps its own action.
  assert_eq!(catch.submit().unwrap().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_submit_twice_is_illegal_state() {
  setup_tracing();
  let session = session();

  let op = session.local_operation::<()>().unwrap();
  op.on_execution(|_ctx| Ok(())).unwrap();
  op.submit().unwrap().await.unwrap();
  assert!(matches!(op.submit(), Err(CatenaError::IllegalState(_))));

  let group = session.operation_group::<(), ()>().unwrap();
  group.submit().unwrap();
  assert!(matches!(group.submit(), Err(CatenaError::IllegalState(_))));
  group.close().unwrap();
}

#[tokio::test]
#[serial]
async fn test_configuration_after_submit_is_illegal_state() {
  setup_tracing();
  let session = session();

  let op = session.local_operation::<()>().unwrap();
  op.on_execution(|_ctx| Ok(())).unwrap();
  let submission = op.submit().unwrap();
  assert!(matches!(op.timeout(Duration::from_secs(1)), Err(CatenaError::IllegalState(_))));
  assert!(matches!(op.on_error(|_err: &CatenaError| {}), Err(CatenaError::IllegalState(_))));
  assert!(matches!(op.on_execution(|_ctx| Ok(())), Err(CatenaError::IllegalState(_))));
  submission.await.unwrap();
}

#[tokio::test]
#[serial]
async fn test_group_settings_apply_once_and_freeze_with_first_member() {
  setup_tracing();
  let session = session();

  let group = session.operation_group::<i32, i32>().unwrap();
  assert_eq!(group.phase(), GroupPhase::Configuring);
  group.parallel().unwrap();
  assert!(matches!(group.parallel(), Err(CatenaError::IllegalState(_))));
  group.independent().unwrap();
  assert!(matches!(group.independent(), Err(CatenaError::IllegalState(_))));
  group.collect(Collector::summing()).unwrap();
  assert!(matches!(group.collect(Collector::summing()), Err(CatenaError::IllegalState(_))));

  let fresh = session.operation_group::<i32, i32>().unwrap();
  let _member = fresh.local_operation().unwrap();
  assert_eq!(fresh.phase(), GroupPhase::Frozen(FreezeCause::MemberCreated));
  assert!(matches!(fresh.parallel(), Err(CatenaError::IllegalState(_))));
  assert!(matches!(fresh.independent(), Err(CatenaError::IllegalState(_))));
  assert!(matches!(fresh.conditional(resolved(true)), Err(CatenaError::IllegalState(_))));
  assert!(matches!(fresh.collect(Collector::summing()), Err(CatenaError::IllegalState(_))));

  let submitted = session.operation_group::<i32, i32>().unwrap();
  submitted.submit().unwrap();
  assert_eq!(submitted.phase(), GroupPhase::Frozen(FreezeCause::Submitted));
  assert!(matches!(submitted.parallel(), Err(CatenaError::IllegalState(_))));
  submitted.close().unwrap();
}

#[tokio::test]
#[serial]
async fn test_closed_group_rejects_members_and_second_close() {
  setup_tracing();
  let session = session();

  let group = session.operation_group::<i32, i32>().unwrap();
  group.close().unwrap();
  assert!(group.is_closed());
  assert!(matches!(group.local_operation(), Err(CatenaError::IllegalState(_))));
  assert!(matches!(group.operation("SELECT 1"), Err(CatenaError::IllegalState(_))));
  // Closed is reported before the argument is looked at.
  assert!(matches!(group.operation(""), Err(CatenaError::IllegalState(_))));
  assert!(matches!(group.close(), Err(CatenaError::IllegalState(_))));
}

#[tokio::test]
#[serial]
async fn test_invalid_arguments_are_rejected() {
  setup_tracing();
  let session = session();

  assert!(matches!(session.operation::<u64>("   "), Err(CatenaError::IllegalArgument(_))));
  let op = session.local_operation::<()>().unwrap();
  assert!(matches!(op.timeout(Duration::ZERO), Err(CatenaError::IllegalArgument(_))));
}

#[tokio::test]
#[serial]
async fn test_local_operation_without_action_cannot_submit() {
  setup_tracing();
  let session = session();

  let op = session.local_operation::<()>().unwrap();
  assert!(matches!(op.submit(), Err(CatenaError::IllegalState(_))));
  assert_eq!(op.lifecycle(), OperationLifecycle::New);
}

#[tokio::test]
#[serial]
async fn test_closed_session_rejects_new_operations() {
  setup_tracing();
  let session = session();

  let op = session.local_operation::<i32>().unwrap();
  op.on_execution(|_ctx| Ok(1)).unwrap();
  session.close().unwrap();
  assert!(session.is_closed());

  // Already created operations can no longer be chained either.
  assert!(matches!(op.submit(), Err(CatenaError::IllegalState(_))));
  assert_eq!(op.lifecycle(), OperationLifecycle::New);
  assert!(matches!(session.local_operation::<i32>(), Err(CatenaError::IllegalState(_))));
}

#[test]
fn test_session_needs_a_runtime() {
  let result = Session::builder().build();
  assert!(matches!(result, Err(CatenaError::IllegalState(_))));
}

#[test]
fn test_session_with_explicit_executor() {
  let runtime = tokio::runtime::Builder::new_multi_thread()
    .worker_threads(2)
    .enable_all()
    .build()
    .unwrap();
  let session = Session::builder().executor(runtime.handle().clone()).name("explicit").build().unwrap();
  assert_eq!(session.config().name, "explicit");

  let op = session.local_operation::<i32>().unwrap();
  op.on_execution(|_ctx| Ok(9)).unwrap();
  let submission = op.submit().unwrap();
  assert_eq!(runtime.block_on(submission.outcome()).unwrap(), 9);
}
