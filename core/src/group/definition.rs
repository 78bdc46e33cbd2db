// catena/src/group/definition.rs

//! Contains the `OperationGroup<S, T>` struct, its one-shot configuration and
//! the factories that create its members.

use crate::core::operation::{Operation, OperationCore};
use crate::error::{CatenaError, CatenaResult};
use crate::group::chain::{GroupChain, MemberSlot, Sink};
use crate::group::collector::{Accumulation, Collector, CollectorState, NoAccumulation};
use crate::group::config::{GroupPhase, GroupSetting};
use crate::operation::local::check_owner;
use crate::operation::statement::checked_sql;
use crate::operation::{LocalOperation, StatementOperation};
use crate::transaction::{TransactionCompletion, TransactionOutcome};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// A composite operation whose members produce `S` and whose result is `T`.
///
/// Members are chained in submission order, or all against the group's start
/// when the group is [`parallel`](OperationGroup::parallel). Each successful
/// member result is folded into the group's [`Collector`]; the group finishes
/// once it has been [`close`](OperationGroup::close)d and its last member has
/// completed. A group that is never closed never finishes.
///
/// The handle is cheap to clone; all clones refer to the same group.
pub struct OperationGroup<S, T>
where
  S: Clone + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  pub(crate) inner: Arc<GroupInner<S, T>>,
}

pub(crate) struct GroupInner<S, T>
where
  S: Clone + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  pub(crate) core: Arc<OperationCore>,
  /// Where this group's members are chained.
  pub(crate) chain: Arc<GroupChain>,
  /// Where this group itself is chained.
  pub(crate) parent: Arc<GroupChain>,
  /// Feeds this group's result into the parent's accumulator.
  pub(crate) parent_sink: Option<Sink<Option<T>>>,
  pub(crate) accumulation: Mutex<Arc<dyn Accumulation<S, T>>>,
  pub(crate) condition: Mutex<Option<BoxFuture<'static, CatenaResult<bool>>>>,
}

impl<S, T> Clone for OperationGroup<S, T>
where
  S: Clone + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  fn clone(&self) -> Self {
    Self {
      inner: self.inner.clone(),
    }
  }
}

impl<S, T> fmt::Debug for OperationGroup<S, T>
where
  S: Clone + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("OperationGroup")
      .field("core", &self.inner.core)
      .field("phase", &self.phase())
      .field("parallel", &self.is_parallel())
      .field("independent", &self.is_independent())
      .finish()
  }
}

impl<S, T> OperationGroup<S, T>
where
  S: Clone + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  /// A new, unconfigured group that will be chained into `parent`.
  pub(crate) fn nested(parent: Arc<GroupChain>, parent_sink: Option<Sink<Option<T>>>) -> Self {
    let context = parent.context().clone();
    let core = OperationCore::new("group", context.config.default_timeout);
    let no_accumulation: Arc<dyn Accumulation<S, T>> = Arc::new(NoAccumulation);
    Self {
      inner: Arc::new(GroupInner {
        core,
        chain: GroupChain::new(context),
        parent,
        parent_sink,
        accumulation: Mutex::new(no_accumulation),
        condition: Mutex::new(None),
      }),
    }
  }

  // --- Configuration ---

  /// Members wait only for the group's start instead of for each other.
  pub fn parallel(&self) -> CatenaResult<&Self> {
    self.inner.chain.apply(GroupSetting::Parallel)?;
    Ok(self)
  }

  /// Member failures are not seen by the operation after this group.
  pub fn independent(&self) -> CatenaResult<&Self> {
    self.inner.chain.apply(GroupSetting::Independent)?;
    Ok(self)
  }

  /// The group runs its members only if `condition` resolves to `true`.
  /// A failing condition counts as `false`.
  pub fn conditional<F>(&self, condition: F) -> CatenaResult<&Self>
  where
    F: Future<Output = CatenaResult<bool>> + Send + 'static,
  {
    self.inner.chain.apply(GroupSetting::Conditional)?;
    *self.inner.condition.lock() = Some(condition.boxed());
    Ok(self)
  }

  /// Reduces member results into the group result with `collector`.
  pub fn collect<A>(&self, collector: Collector<S, A, T>) -> CatenaResult<&Self>
  where
    A: Send + 'static,
  {
    self.inner.chain.apply(GroupSetting::Collect)?;
    *self.inner.accumulation.lock() = Arc::new(CollectorState::new(collector));
    Ok(self)
  }

  pub fn is_parallel(&self) -> bool {
    self.inner.chain.is_applied(GroupSetting::Parallel)
  }

  pub fn is_independent(&self) -> bool {
    self.inner.chain.is_applied(GroupSetting::Independent)
  }

  pub fn is_closed(&self) -> bool {
    self.inner.chain.is_closed()
  }

  pub fn phase(&self) -> GroupPhase {
    self.inner.chain.phase()
  }

  // --- Members ---

  pub fn local_operation(&self) -> CatenaResult<LocalOperation<S>> {
    Ok(self.member_slot()?.local())
  }

  /// An unskippable member that yields `S::default()`, letting the chain
  /// continue after a failure.
  pub fn catch_operation(&self) -> CatenaResult<LocalOperation<S>>
  where
    S: Default,
  {
    Ok(self.member_slot()?.catch())
  }

  pub fn operation(&self, sql: &str) -> CatenaResult<StatementOperation<S>> {
    self.inner.chain.assert_open()?;
    let sql = checked_sql(sql)?;
    Ok(self.member_slot()?.statement(sql))
  }

  pub fn end_transaction_operation(&self, transaction: &TransactionCompletion) -> CatenaResult<LocalOperation<S>>
  where
    S: From<TransactionOutcome>,
  {
    self.inner.chain.assert_open()?;
    check_owner(transaction, self.inner.chain.context().id)?;
    Ok(self.member_slot()?.end_transaction(transaction))
  }

  /// A nested group whose result becomes one member result of this group.
  pub fn operation_group<R>(&self) -> CatenaResult<OperationGroup<R, S>>
  where
    R: Clone + Send + Sync + 'static,
  {
    self.inner.chain.register_member()?;
    let sink = self.member_sink();
    let parent_sink: Sink<Option<S>> = Arc::new(move |result: Option<S>| {
      if let Some(value) = result {
        sink(value);
      }
    });
    Ok(OperationGroup::nested(self.inner.chain.clone(), Some(parent_sink)))
  }

  fn member_slot(&self) -> CatenaResult<MemberSlot<S>> {
    self.inner.chain.register_member()?;
    Ok(MemberSlot::new(self.inner.chain.clone(), Some(self.member_sink())))
  }

  /// Configuration is frozen once a member exists, so the accumulation and
  /// the parallel flag read here are final.
  fn member_sink(&self) -> Sink<S> {
    let accumulation = self.inner.accumulation.lock().clone();
    if self.is_parallel() {
      Arc::new(move |value: S| accumulation.merge(value))
    } else {
      Arc::new(move |value: S| accumulation.accumulate(value))
    }
  }
}

impl<S, T> Operation for OperationGroup<S, T>
where
  S: Clone + Send + Sync + 'static,
  T: Clone + Send + Sync + 'static,
{
  fn core(&self) -> &Arc<OperationCore> {
    &self.inner.core
  }

  /// Canceling a group that has not started also cancels its members, so
  /// their handles settle even if the group is never submitted.
  fn cancel(&self) -> bool {
    let core = &self.inner.core;
    if !core.cancel() {
      return false;
    }
    self
      .inner
      .chain
      .abort(CatenaError::skipped(format!("group {} was canceled", core.id())));
    true
  }
}
