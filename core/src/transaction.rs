// catena/src/transaction.rs

//! Shared flag object recording how a multi-operation unit of work must end.

use crate::error::{CatenaError, CatenaResult};
use crate::session::{Session, SessionId};
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{event, Level};

/// How an end-transaction operation finished the unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionOutcome {
  Committed,
  RolledBack,
}

#[derive(Debug)]
struct TransactionFlags {
  rollback_only: bool,
  in_flight: bool,
}

/// Outcome flags of a transaction, shared between application code and the
/// session that owns it.
///
/// `in_flight` goes from `true` to `false` exactly once, when the owning
/// session resolves the transaction. Every mutation holds the same lock.
#[derive(Debug, Clone)]
pub struct TransactionCompletion {
  owner: SessionId,
  flags: Arc<Mutex<TransactionFlags>>,
}

impl TransactionCompletion {
  pub(crate) fn new(owner: SessionId) -> Self {
    Self {
      owner,
      flags: Arc::new(Mutex::new(TransactionFlags {
        rollback_only: false,
        in_flight: true,
      })),
    }
  }

  /// Forces the transaction to roll back.
  ///
  /// Returns `true` only for the call that set the flag while the transaction
  /// was in flight. Later calls, and any call after resolution, return `false`.
  pub fn mark_rollback_only(&self) -> bool {
    let mut flags = self.flags.lock();
    if flags.in_flight && !flags.rollback_only {
      flags.rollback_only = true;
      true
    } else {
      false
    }
  }

  pub(crate) fn owner(&self) -> SessionId {
    self.owner
  }

  pub fn is_rollback_only(&self) -> bool {
    self.flags.lock().rollback_only
  }

  pub fn is_in_flight(&self) -> bool {
    self.flags.lock().in_flight
  }

  /// Decides commit (`true`) or rollback (`false`) on behalf of `session`.
  ///
  /// Fails with `IllegalArgument` if `session` does not own this transaction
  /// and with `IllegalState` if it was already resolved.
  pub fn resolve(&self, session: &Session) -> CatenaResult<bool> {
    self.resolve_for(session.id())
  }

  pub(crate) fn resolve_for(&self, session: SessionId) -> CatenaResult<bool> {
    if session != self.owner {
      return Err(CatenaError::illegal_argument(format!(
        "transaction belongs to {} and cannot be resolved by {}",
        self.owner, session
      )));
    }
    let mut flags = self.flags.lock();
    if !flags.in_flight {
      return Err(CatenaError::illegal_state("transaction already resolved"));
    }
    flags.in_flight = false;
    let commit = !flags.rollback_only;
    event!(Level::INFO, session = %self.owner, commit, "Transaction resolved.");
    Ok(commit)
  }
}
