// catena/src/core/completion.rs

//! Single-assignment completion cells the engine composes.
//!
//! A `Completion<T>` is a cloneable, shareable future: every clone observes the
//! same outcome, and the work behind it runs at most once. Completions are
//! lazy, so whoever creates one for a member also spawns a driver for it.

use crate::error::{CatenaError, CatenaResult};
use futures::channel::oneshot;
use futures::future::{self, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

/// The outcome of an operation: its value or the failure/skip it ended with.
pub type Outcome<T> = CatenaResult<T>;

/// Shared handle on an operation's eventual outcome.
pub type Completion<T> = Shared<BoxFuture<'static, Outcome<T>>>;

/// Value-less completion used to thread ordering through a chain.
pub(crate) type Signal = Completion<()>;

#[cfg(test)]
pub(crate) fn ready<T>(outcome: Outcome<T>) -> Completion<T>
where
  T: Clone + Send + Sync + 'static,
{
  future::ready(outcome).boxed().shared()
}

/// Drops the value of a completion, keeping only success/failure.
pub(crate) fn signal_of<T>(completion: Completion<T>) -> Signal
where
  T: Clone + Send + Sync + 'static,
{
  completion.map(|outcome| outcome.map(|_| ())).boxed().shared()
}

/// Like `signal_of`, but a failure is reported as success.
pub(crate) fn absorbing_signal_of<T>(completion: Completion<T>) -> Signal
where
  T: Clone + Send + Sync + 'static,
{
  completion.map(|_| Ok(())).boxed().shared()
}

/// Completes once both signals have; the first failure wins.
pub(crate) fn both(first: Signal, second: Signal) -> Signal {
  async move {
    let (a, b) = future::join(first, second).await;
    a.and(b)
  }
  .boxed()
  .shared()
}

/// A single-assignment cell that many waiters can await.
///
/// Completing it a second time is a no-op. If the cell is dropped without
/// being completed, waiters observe `None`.
pub(crate) struct Gate<T: Clone + Send + Sync + 'static> {
  sender: Mutex<Option<oneshot::Sender<T>>>,
  waiter: Shared<BoxFuture<'static, Option<T>>>,
}

impl<T: Clone + Send + Sync + 'static> Gate<T> {
  pub(crate) fn new() -> Self {
    let (sender, receiver) = oneshot::channel::<T>();
    Self {
      sender: Mutex::new(Some(sender)),
      waiter: receiver.map(|received| received.ok()).boxed().shared(),
    }
  }

  /// Returns `true` if this call assigned the value.
  pub(crate) fn complete(&self, value: T) -> bool {
    match self.sender.lock().take() {
      Some(sender) => sender.send(value).is_ok(),
      None => false,
    }
  }

  pub(crate) fn is_completed(&self) -> bool {
    self.sender.lock().is_none()
  }

  pub(crate) fn wait(&self) -> Shared<BoxFuture<'static, Option<T>>> {
    self.waiter.clone()
  }
}

impl Gate<Outcome<()>> {
  /// The gate as a chain signal. An abandoned gate reads as a skip.
  pub(crate) fn signal(&self) -> Signal {
    self
      .wait()
      .map(|value| value.unwrap_or_else(|| Err(CatenaError::skipped("start gate abandoned"))))
      .boxed()
      .shared()
  }
}
