// catena/src/core/executor.rs

//! The two policies for attaching a leaf action to its predecessor.

use crate::core::completion::{Outcome, Signal};
use crate::core::operation::{Action, OperationContext, OperationCore};
use crate::error::CatenaError;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{event, Level};

/// How a leaf reacts to the outcome of the operation before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
  /// Runs only if the predecessor succeeded; otherwise the predecessor's
  /// failure passes through untouched.
  Skippable,
  /// Always runs when its turn arrives, unless the operation itself was
  /// canceled. Failures (the predecessor's and its own) are shown to the error
  /// handler; its own failure is re-raised.
  Unskippable,
}

impl ExecutionPolicy {
  /// Builds the future that runs `action` after `predecessor`.
  pub(crate) fn follows<T>(
    self,
    predecessor: Signal,
    core: Arc<OperationCore>,
    action: Action<T>,
    runtime: Handle,
  ) -> BoxFuture<'static, Outcome<T>>
  where
    T: Send + 'static,
  {
    match self {
      ExecutionPolicy::Skippable => async move {
        if let Err(err) = predecessor.await {
          event!(Level::DEBUG, operation = %core.id(), error = %err, "Predecessor failed, skipping action.");
          return Err(err);
        }
        run_action(&core, action, &runtime).await
      }
      .boxed(),
      ExecutionPolicy::Unskippable => async move {
        let predecessor = predecessor.await;
        // Canceled members stay quiet: the handler sees neither the
        // predecessor's failure nor the skip.
        if core.is_canceled() {
          event!(Level::DEBUG, operation = %core.id(), "Unskippable operation was canceled before its turn.");
          return Err(core.canceled_error());
        }
        if let Err(err) = predecessor {
          event!(Level::DEBUG, operation = %core.id(), error = %err, "Predecessor failed, running unskippable action anyway.");
          core.notify_error(&err);
        }
        let result = run_action(&core, action, &runtime).await;
        if let Err(err) = &result {
          core.notify_error(err);
        }
        result
      }
      .boxed(),
    }
  }
}

/// Checks cancellation, then runs the action on the blocking pool, bounded by
/// the operation's timeout.
pub(crate) async fn run_action<T>(core: &Arc<OperationCore>, action: Action<T>, runtime: &Handle) -> Outcome<T>
where
  T: Send + 'static,
{
  core.begin_execution()?;
  let context = OperationContext::new(core.clone());
  let task = runtime.spawn_blocking(move || action(&context));

  let joined = match core.timeout() {
    Some(limit) => match tokio::time::timeout(limit, task).await {
      Ok(joined) => joined,
      Err(_) => {
        event!(Level::WARN, operation = %core.id(), timeout_ms = limit.as_millis() as u64, "Operation timed out.");
        core.settle();
        return Err(CatenaError::Timeout {
          operation: core.id().as_u64(),
          millis: limit.as_millis(),
        });
      }
    },
    None => task.await,
  };
  core.settle();

  match joined {
    Ok(Ok(value)) => Ok(value),
    Ok(Err(err)) => {
      event!(Level::ERROR, operation = %core.id(), kind = core.kind(), error = %err, "Action failed.");
      Err(err)
    }
    Err(join_err) => {
      event!(Level::ERROR, operation = %core.id(), error = %join_err, "Action task did not finish.");
      Err(CatenaError::Internal(format!("action of {} panicked or was aborted: {}", core.id(), join_err)))
    }
  }
}
