// catena/src/group/execution.rs

//! Submitting and closing a group, and the protocol a group follows once its
//! turn in the parent chain arrives.

use crate::core::completion::{Outcome, Signal};
use crate::core::operation::OperationCore;
use crate::error::{CatenaError, CatenaResult};
use crate::group::chain::{GroupChain, Link};
use crate::group::collector::Accumulation;
use crate::group::definition::OperationGroup;
use crate::submission::Submission;
use futures::future::{BoxFuture, FutureExt};
use std::sync::Arc;
use tracing::{event, instrument, Level};

impl<S, T> OperationGroup<S, T>
where
  S: Clone + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  /// Chains the group into its parent.
  ///
  /// Members created before or after this call start only once the group's
  /// own turn arrives (and its condition holds). The result is `None` when no
  /// collector was configured or the condition was false.
  pub fn submit(&self) -> CatenaResult<Submission<Option<T>>> {
    let inner = &self.inner;
    let reservation = inner.parent.reserve(&inner.core)?;
    inner.chain.on_submit()?;
    let accumulation = inner.accumulation.lock().clone();
    accumulation.seed();

    let run = GroupRun {
      core: inner.core.clone(),
      chain: inner.chain.clone(),
      accumulation,
      condition: inner.condition.lock().take(),
    };
    let link = Link {
      as_group: true,
      notify_failure: true,
      absorb_failure: self.is_independent(),
      sink: inner.parent_sink.clone(),
    };
    let completion = reservation.link(link, move |predecessor| run.follows(predecessor).boxed())?;
    event!(
      Level::DEBUG,
      group = %inner.core.id(),
      parallel = self.is_parallel(),
      independent = self.is_independent(),
      "Group submitted."
    );
    Ok(Submission::new(inner.core.clone(), completion))
  }

  /// Ends the membership window. The group finishes once this has been called
  /// and its last member has completed.
  pub fn close(&self) -> CatenaResult<()> {
    self.inner.chain.close()?;
    event!(Level::DEBUG, group = %self.inner.core.id(), "Group closed.");
    Ok(())
  }
}

/// What a submitted group needs once its turn arrives.
struct GroupRun<S, T> {
  core: Arc<OperationCore>,
  chain: Arc<GroupChain>,
  accumulation: Arc<dyn Accumulation<S, T>>,
  condition: Option<BoxFuture<'static, CatenaResult<bool>>>,
}

impl<S, T> GroupRun<S, T>
where
  S: Clone + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  #[instrument(name = "OperationGroup::follows", skip_all, fields(group = %self.core.id()))]
  async fn follows(self, predecessor: Signal) -> Outcome<Option<T>> {
    let GroupRun {
      core,
      chain,
      accumulation,
      condition,
    } = self;

    if let Err(err) = predecessor.await {
      event!(Level::DEBUG, error = %err, "Predecessor failed, members will be skipped.");
      chain.abort(err.clone());
      return Err(err);
    }
    if let Err(err) = core.begin_execution() {
      chain.abort(err.clone());
      return Err(err);
    }

    if let Some(condition) = condition {
      let enabled = match condition.await {
        Ok(enabled) => enabled,
        Err(err) => {
          event!(Level::WARN, error = %err, "Group condition failed; treating it as false.");
          false
        }
      };
      if !enabled {
        event!(Level::INFO, "Group condition is false, skipping all members.");
        chain.abort(CatenaError::skipped("group condition is false"));
        return Ok(None);
      }
    }

    chain.start();
    event!(Level::DEBUG, "Group started.");

    let finished = async {
      chain.held.wait().await;
      chain.tail().await
    };
    let outcome = match core.timeout() {
      Some(limit) => match tokio::time::timeout(limit, finished).await {
        Ok(outcome) => outcome,
        Err(_) => {
          event!(Level::WARN, timeout_ms = limit.as_millis() as u64, "Group timed out.");
          Err(CatenaError::Timeout {
            operation: core.id().as_u64(),
            millis: limit.as_millis(),
          })
        }
      },
      None => finished.await,
    };

    if let Err(err) = outcome {
      event!(Level::DEBUG, error = %err, "Group finished with failure.");
      return Err(err);
    }
    let result = accumulation.finish();
    event!(Level::DEBUG, has_result = result.is_some(), "Group finished.");
    Ok(result)
  }
}
