// catena/src/submission.rs

//! The caller-visible handle returned when an operation is submitted.

use crate::core::completion::{Completion, Outcome};
use crate::core::operation::{OperationCore, OperationId};
use futures::FutureExt;
use std::fmt;
use std::future::IntoFuture;
use std::sync::Arc;

/// A submitted operation's eventual outcome, plus the ability to cancel it.
///
/// Await it directly (`submission.await`) or take a cloneable
/// [`Completion`] to compose further.
pub struct Submission<T>
where
  T: Clone + Send + Sync + 'static,
{
  operation: Arc<OperationCore>,
  completion: Completion<T>,
}

impl<T> Submission<T>
where
  T: Clone + Send + Sync + 'static,
{
  pub(crate) fn new(operation: Arc<OperationCore>, completion: Completion<T>) -> Self {
    Self { operation, completion }
  }

  pub fn operation_id(&self) -> OperationId {
    self.operation.id()
  }

  /// Best-effort cancellation; see [`crate::Operation::cancel`].
  pub fn cancel(&self) -> bool {
    self.operation.cancel()
  }

  pub fn completion(&self) -> Completion<T> {
    self.completion.clone()
  }

  /// The outcome if it is already available.
  pub fn peek(&self) -> Option<Outcome<T>> {
    self.completion.peek().cloned()
  }

  pub fn is_done(&self) -> bool {
    self.completion.peek().is_some()
  }

  /// Awaits the outcome without consuming the handle.
  pub async fn outcome(&self) -> Outcome<T> {
    self.completion.clone().await
  }
}

impl<T> Clone for Submission<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn clone(&self) -> Self {
    Self {
      operation: self.operation.clone(),
      completion: self.completion.clone(),
    }
  }
}

impl<T> fmt::Debug for Submission<T>
where
  T: Clone + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Submission")
      .field("operation", &self.operation.id())
      .field("lifecycle", &self.operation.lifecycle())
      .field("done", &self.is_done())
      .finish()
  }
}

impl<T> IntoFuture for Submission<T>
where
  T: Clone + Send + Sync + 'static,
{
  type Output = Outcome<T>;
  type IntoFuture = Completion<T>;

  fn into_future(self) -> Self::IntoFuture {
    self.completion
  }
}

/// Drives a member's completion on the runtime so it progresses whether or
/// not anyone awaits its submission.
pub(crate) fn drive<T>(runtime: &tokio::runtime::Handle, completion: &Completion<T>)
where
  T: Clone + Send + Sync + 'static,
{
  runtime.spawn(completion.clone().map(drop));
}
