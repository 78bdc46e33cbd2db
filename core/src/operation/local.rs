// catena/src/operation/local.rs

//! Leaf operations whose work is a caller-supplied function: local, catch and
//! end-transaction members.

use crate::core::completion::Signal;
use crate::core::executor::ExecutionPolicy;
use crate::core::operation::{Action, Operation, OperationContext, OperationCore};
use crate::error::{CatenaError, CatenaResult};
use crate::group::chain::MemberSlot;
use crate::session::SessionId;
use crate::submission::Submission;
use crate::transaction::{TransactionCompletion, TransactionOutcome};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{event, Level};

/// A member that runs a synchronous action on the session's executor.
pub struct LocalOperation<S>
where
  S: Clone + Send + Sync + 'static,
{
  core: Arc<OperationCore>,
  slot: MemberSlot<S>,
  policy: ExecutionPolicy,
  action: Mutex<Option<Action<S>>>,
  /// Catch and end-transaction members come with their action.
  fixed: bool,
}

impl<S> fmt::Debug for LocalOperation<S>
where
  S: Clone + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("LocalOperation")
      .field("core", &self.core)
      .field("policy", &self.policy)
      .field("action_present", &self.action.lock().is_some())
      .finish()
  }
}

impl<S> LocalOperation<S>
where
  S: Clone + Send + Sync + 'static,
{
  pub(crate) fn new(slot: MemberSlot<S>, kind: &'static str, policy: ExecutionPolicy, action: Option<Action<S>>) -> Self {
    let core = OperationCore::new(kind, slot.context().config.default_timeout);
    Self {
      core,
      slot,
      policy,
      fixed: action.is_some(),
      action: Mutex::new(action),
    }
  }

  pub fn policy(&self) -> ExecutionPolicy {
    self.policy
  }

  /// Sets the work this operation performs. Catch and end-transaction
  /// operations reject this with `IllegalState`.
  pub fn on_execution<F>(&self, action: F) -> CatenaResult<&Self>
  where
    F: FnOnce(&OperationContext) -> CatenaResult<S> + Send + 'static,
  {
    self.core.assert_unsubmitted()?;
    if self.fixed {
      return Err(CatenaError::illegal_state(format!(
        "{} {} has a fixed action",
        self.core.kind(),
        self.core.id()
      )));
    }
    *self.action.lock() = Some(Box::new(action));
    Ok(self)
  }

  /// Places the operation at the end of its group's chain. A rejected submit
  /// leaves the operation as it was.
  pub fn submit(&self) -> CatenaResult<Submission<S>> {
    let reservation = self.slot.chain.reserve(&self.core)?;
    let action = self
      .action
      .lock()
      .take()
      .ok_or_else(|| CatenaError::illegal_state(format!("{} {} has no action", self.core.kind(), self.core.id())))?;

    let core = self.core.clone();
    let policy = self.policy;
    let runtime = self.slot.context().runtime.clone();
    let link = self.slot.link(policy == ExecutionPolicy::Skippable);
    let completion = reservation.link(link, move |predecessor: Signal| {
      policy.follows(predecessor, core, action, runtime)
    })?;
    event!(Level::TRACE, operation = %self.core.id(), ?policy, "Local operation submitted.");
    Ok(Submission::new(self.core.clone(), completion))
  }
}

impl<S> Operation for LocalOperation<S>
where
  S: Clone + Send + Sync + 'static,
{
  fn core(&self) -> &Arc<OperationCore> {
    &self.core
  }
}

pub(crate) fn check_owner(transaction: &TransactionCompletion, session: SessionId) -> CatenaResult<()> {
  if transaction.owner() != session {
    return Err(CatenaError::illegal_argument(format!(
      "transaction belongs to {}, not {}",
      transaction.owner(),
      session
    )));
  }
  Ok(())
}

impl<S> MemberSlot<S>
where
  S: Clone + Send + Sync + 'static,
{
  pub(crate) fn local(self) -> LocalOperation<S> {
    LocalOperation::new(self, "local", ExecutionPolicy::Skippable, None)
  }

  /// An unskippable member producing `S::default()`.
  pub(crate) fn catch(self) -> LocalOperation<S>
  where
    S: Default,
  {
    let action: Action<S> = Box::new(|_context: &OperationContext| Ok(S::default()));
    LocalOperation::new(self, "catch", ExecutionPolicy::Unskippable, Some(action))
  }

  /// Resolves `transaction` and asks the driver to commit or roll back.
  pub(crate) fn end_transaction(self, transaction: &TransactionCompletion) -> LocalOperation<S>
  where
    S: From<TransactionOutcome>,
  {
    let session = self.context().id;
    let driver = self.context().driver.clone();
    let transaction = transaction.clone();
    let action: Action<S> = Box::new(move |context: &OperationContext| {
      let commit = transaction.resolve_for(session)?;
      driver.end_transaction(commit)?;
      let outcome = if commit {
        TransactionOutcome::Committed
      } else {
        TransactionOutcome::RolledBack
      };
      event!(Level::INFO, operation = %context.id(), ?outcome, "Transaction ended.");
      Ok(S::from(outcome))
    });
    LocalOperation::new(self, "end_transaction", ExecutionPolicy::Skippable, Some(action))
  }
}
