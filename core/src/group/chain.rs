// catena/src/group/chain.rs

//! The type-erased part of a group: its start gate (`head`), close gate
//! (`held`), the mutable `tail` frontier and the one-shot configuration.
//!
//! Members are chained here when they are submitted, in two steps: a
//! reservation runs every check that can reject the member, then linking
//! cannot fail except for a concurrent cancel. A sequential member
//! waits on the current tail and becomes the new tail; a parallel member waits
//! on the head and is joined into the tail.

use crate::core::completion::{self, Completion, Gate, Outcome, Signal};
use crate::core::operation::OperationCore;
use crate::error::{CatenaError, CatenaResult};
use crate::group::config::{GroupConfig, GroupPhase, GroupSetting};
use crate::session::ExecutionContext;
use crate::submission;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::{event, span, Instrument, Level};

/// Receives each successful member result (accumulation into the owning group).
pub(crate) type Sink<O> = Arc<dyn Fn(O) + Send + Sync + 'static>;

pub(crate) struct GroupChain {
  context: Arc<ExecutionContext>,
  config: Mutex<GroupConfig>,
  pub(crate) head: Gate<Outcome<()>>,
  pub(crate) held: Gate<()>,
  frontier: Mutex<Frontier>,
}

struct Frontier {
  tail: Signal,
  /// Members chained before the head completed; canceled if the group is
  /// aborted.
  pending: Vec<Arc<OperationCore>>,
  aborted: bool,
}

/// How a member's own completion is linked into its group.
pub(crate) struct Link<O> {
  pub(crate) as_group: bool,
  /// Hand failures to the member's error handler once it settles.
  pub(crate) notify_failure: bool,
  /// Successors see success even if this member failed.
  pub(crate) absorb_failure: bool,
  pub(crate) sink: Option<Sink<O>>,
}

impl GroupChain {
  pub(crate) fn new(context: Arc<ExecutionContext>) -> Arc<Self> {
    let head = Gate::new();
    let tail = head.signal();
    Arc::new(Self {
      context,
      config: Mutex::new(GroupConfig::new()),
      head,
      held: Gate::new(),
      frontier: Mutex::new(Frontier {
        tail,
        pending: Vec::new(),
        aborted: false,
      }),
    })
  }

  /// The session's outermost chain: its head is complete from the start.
  pub(crate) fn root(context: Arc<ExecutionContext>) -> Arc<Self> {
    let chain = Self::new(context);
    chain.start();
    chain
  }

  pub(crate) fn context(&self) -> &Arc<ExecutionContext> {
    &self.context
  }

  pub(crate) fn phase(&self) -> GroupPhase {
    self.config.lock().phase()
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.phase() == GroupPhase::Closed
  }

  pub(crate) fn is_applied(&self, setting: GroupSetting) -> bool {
    self.config.lock().is_applied(setting)
  }

  pub(crate) fn assert_open(&self) -> CatenaResult<()> {
    self.config.lock().assert_open()
  }

  pub(crate) fn apply(&self, setting: GroupSetting) -> CatenaResult<()> {
    self.config.lock().apply(setting)
  }

  /// Records that a member was created; freezes configuration.
  pub(crate) fn register_member(&self) -> CatenaResult<()> {
    self.config.lock().on_member_created()
  }

  pub(crate) fn on_submit(&self) -> CatenaResult<()> {
    self.config.lock().on_submit()
  }

  /// Closes the group to new members and opens the close gate.
  pub(crate) fn close(&self) -> CatenaResult<()> {
    self.config.lock().close()?;
    self.held.complete(());
    Ok(())
  }

  /// The frontier the group's result waits on. Final once the group is closed.
  pub(crate) fn tail(&self) -> Signal {
    self.frontier.lock().tail.clone()
  }

  /// Completes the head successfully, releasing every chained member.
  pub(crate) fn start(&self) {
    let mut frontier = self.frontier.lock();
    frontier.pending.clear();
    self.head.complete(Ok(()));
  }

  /// Shuts the group without running it: every member chained so far and any
  /// chained later is canceled, and the head completes with `failure`. No
  /// member action runs after this, unskippable ones included.
  pub(crate) fn abort(&self, failure: CatenaError) {
    let mut frontier = self.frontier.lock();
    frontier.aborted = true;
    for member in frontier.pending.drain(..) {
      member.cancel();
    }
    self.head.complete(Err(failure));
  }

  /// Checks that `member` may join this chain, and holds the group's
  /// configuration until the member is linked so `close` cannot slip in
  /// between. Nothing is changed if the returned reservation is dropped.
  pub(crate) fn reserve(&self, member: &Arc<OperationCore>) -> CatenaResult<Reservation<'_>> {
    let config = self.config.lock();
    config.assert_open()?;
    member.assert_unsubmitted()?;
    Ok(Reservation {
      chain: self,
      config,
      member: member.clone(),
    })
  }
}

/// A member's checked place at the end of a chain. See [`GroupChain::reserve`].
pub(crate) struct Reservation<'a> {
  chain: &'a GroupChain,
  config: MutexGuard<'a, GroupConfig>,
  member: Arc<OperationCore>,
}

impl Reservation<'_> {
  /// Positions the member in the chain and starts driving it.
  ///
  /// `follows` receives the member's predecessor and returns the future that
  /// executes it. The returned completion settles the member and feeds `sink`
  /// before it resolves, so a sequential successor never observes a member
  /// whose result is not yet accumulated.
  pub(crate) fn link<O>(
    self,
    link: Link<O>,
    follows: impl FnOnce(Signal) -> BoxFuture<'static, Outcome<O>>,
  ) -> CatenaResult<Completion<O>>
  where
    O: Clone + Send + Sync + 'static,
  {
    let Reservation { chain, config, member } = self;
    // Fails only if the member was canceled after it was reserved.
    member.mark_submitted(link.as_group)?;
    let parallel = config.is_applied(GroupSetting::Parallel);

    let mut frontier = chain.frontier.lock();
    if frontier.aborted {
      member.cancel();
    } else if !chain.head.is_completed() {
      frontier.pending.push(member.clone());
    }
    let predecessor = if parallel {
      chain.head.signal()
    } else {
      frontier.tail.clone()
    };
    let execution = follows(predecessor);

    let core = member.clone();
    let member_span = span!(
      Level::DEBUG,
      "member_execution",
      operation = %core.id(),
      kind = core.kind(),
      parallel
    );
    let Link {
      notify_failure,
      absorb_failure,
      sink,
      ..
    } = link;
    let completion: Completion<O> = async move {
      let outcome = execution.await;
      match &outcome {
        Ok(value) => {
          if let Some(sink) = &sink {
            sink(value.clone());
          }
        }
        Err(err) => {
          event!(Level::DEBUG, error = %err, "Member finished with failure.");
          if notify_failure {
            core.notify_error(err);
          }
        }
      }
      core.settle();
      outcome
    }
    .instrument(member_span)
    .boxed()
    .shared();

    let member_signal = if absorb_failure {
      completion::absorbing_signal_of(completion.clone())
    } else {
      completion::signal_of(completion.clone())
    };
    frontier.tail = if parallel {
      completion::both(frontier.tail.clone(), member_signal)
    } else {
      member_signal
    };
    event!(Level::DEBUG, session = %chain.context.id, operation = %member.id(), parallel, "Member chained.");

    submission::drive(&chain.context.runtime, &completion);
    Ok(completion)
  }
}

/// A freshly created member's place in its group: where it will be chained
/// and where its result goes.
pub(crate) struct MemberSlot<S> {
  pub(crate) chain: Arc<GroupChain>,
  pub(crate) sink: Option<Sink<S>>,
}

impl<S> MemberSlot<S>
where
  S: Clone + Send + Sync + 'static,
{
  pub(crate) fn new(chain: Arc<GroupChain>, sink: Option<Sink<S>>) -> Self {
    Self { chain, sink }
  }

  pub(crate) fn context(&self) -> &Arc<ExecutionContext> {
    self.chain.context()
  }

  pub(crate) fn link(&self, notify_failure: bool) -> Link<S> {
    Link {
      as_group: false,
      notify_failure,
      absorb_failure: false,
      sink: self.sink.clone(),
    }
  }
}
