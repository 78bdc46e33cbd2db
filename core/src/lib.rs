// src/lib.rs

//! Catena: an async engine for chaining deferred, cancelable operations.
//!
//! Work is expressed as operations attached to a [`Session`]. Operations are
//! composed into [`OperationGroup`]s with features like:
//!  - Strict submission-order chaining, or parallel dispatch after a shared start.
//!  - Result reduction through a [`Collector`] (seed, accumulate, combine, finish).
//!  - Conditional groups that skip every member when their condition is false.
//!  - Independent groups whose member failures do not fail the rest of the chain.
//!  - Skippable members that pass failures through, and unskippable "catch"
//!    members that always run.
//!  - Best-effort cancellation, per-operation timeouts and error observers.
//!  - A [`TransactionCompletion`] handle deciding commit or rollback.

pub mod core;
pub mod driver;
pub mod error;
pub mod group;
pub mod operation;
pub mod session;
pub mod submission;
pub mod transaction;

// --- Re-exports for the Public API ---

pub use crate::core::{
  Completion, ErrorHandler, ExecutionPolicy, Operation, OperationContext, OperationId, OperationLifecycle, Outcome,
};

pub use crate::driver::{Driver, NoopDriver, SqlType, SqlValue, Statement, StatementOutcome};
pub use crate::error::{CatenaError, CatenaResult, WorkFailure};

pub use crate::group::{Collector, FreezeCause, GroupPhase, GroupSetting, OperationGroup};
pub use crate::operation::{LocalOperation, StatementOperation};

pub use crate::session::{Session, SessionBuilder, SessionConfig, SessionId};
pub use crate::submission::Submission;
pub use crate::transaction::{TransactionCompletion, TransactionOutcome};

/*
    Core workflow:
    1. Build a `Session` inside a tokio runtime: `Session::builder().driver(my_driver).build()?`.
    2. Create a group: `let group = session.operation_group::<i64, i64>()?;`
       and configure it once (`parallel()`, `independent()`, `conditional(..)`, `collect(..)`)
       before creating any member.
    3. Create members (`local_operation`, `operation(sql)`, `catch_operation`, ...),
       configure them and `submit()` each one.
    4. `submit()` the group and `close()` it. Its `Submission` resolves once
       the last member finished.
*/
