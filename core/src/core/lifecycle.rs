// catena/src/core/lifecycle.rs

//! The state machine every operation (leaf or group) goes through.

use crate::error::{CatenaError, CatenaResult};

/// Lifecycle of a single operation.
///
/// `New` is the only state in which configuration is accepted. Groups move to
/// `Held` on submission (they stay open for members until closed); leaves move
/// to `Submitted`. `Completed` and `Canceled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationLifecycle {
  New,
  Submitted,
  Held,
  Executing,
  Completed,
  Canceled,
}

impl OperationLifecycle {
  pub fn is_terminal(self) -> bool {
    matches!(self, OperationLifecycle::Completed | OperationLifecycle::Canceled)
  }

  pub fn is_submitted(self) -> bool {
    !matches!(self, OperationLifecycle::New)
  }

  /// Whether `self -> next` is an allowed transition.
  pub fn can_transition_to(self, next: OperationLifecycle) -> bool {
    use OperationLifecycle::*;
    matches!(
      (self, next),
      (New, Submitted)
        | (New, Held)
        | (New, Canceled)
        | (Submitted, Executing)
        | (Submitted, Completed)
        | (Submitted, Canceled)
        | (Held, Executing)
        | (Held, Completed)
        | (Held, Canceled)
        | (Executing, Completed)
    )
  }

  /// Returns the new state, or `IllegalState` if the transition is not allowed.
  pub fn transition(self, next: OperationLifecycle) -> CatenaResult<OperationLifecycle> {
    if self.can_transition_to(next) {
      Ok(next)
    } else {
      Err(CatenaError::illegal_state(format!(
        "Operation cannot move from {:?} to {:?}",
        self, next
      )))
    }
  }
}
