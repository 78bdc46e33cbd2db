// catena/src/error.rs
use anyhow::Error as AnyhowError;
use std::fmt;
use thiserror::Error;

/// Diagnostic record for a failure raised by the work an operation performs.
///
/// Mirrors what a database driver reports: a message, a classification code
/// (SQLSTATE-like), a vendor-specific numeric code, the statement text that
/// was being executed and the position of the problem within it (`-1` if unknown).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkFailure {
  pub message: String,
  pub sql_state: Option<String>,
  pub vendor_code: i32,
  pub sql: Option<String>,
  pub position: i32,
}

impl WorkFailure {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      sql_state: None,
      vendor_code: 0,
      sql: None,
      position: -1,
    }
  }

  pub fn with_sql_state(mut self, sql_state: impl Into<String>) -> Self {
    self.sql_state = Some(sql_state.into());
    self
  }

  pub fn with_vendor_code(mut self, vendor_code: i32) -> Self {
    self.vendor_code = vendor_code;
    self
  }

  pub fn with_sql(mut self, sql: impl Into<String>) -> Self {
    self.sql = Some(sql.into());
    self
  }

  pub fn with_position(mut self, position: i32) -> Self {
    self.position = position;
    self
  }

  /// Fills in the statement text only if the reporter left it empty.
  pub(crate) fn or_sql(mut self, sql: &str) -> Self {
    if self.sql.is_none() {
      self.sql = Some(sql.to_string());
    }
    self
  }
}

impl fmt::Display for WorkFailure {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.message)?;
    if let Some(state) = &self.sql_state {
      write!(f, " [state {}, code {}]", state, self.vendor_code)?;
    }
    if let Some(sql) = &self.sql {
      write!(f, " in `{}`", sql)?;
      if self.position >= 0 {
        write!(f, " at position {}", self.position)?;
      }
    }
    Ok(())
  }
}

impl std::error::Error for WorkFailure {}

/// Every failure the engine can report.
///
/// Usage errors (`IllegalState`, `IllegalArgument`) are returned synchronously
/// by the call that violates the contract. The remaining variants travel
/// through the completion chain. `CatenaError` is `Clone` because a single
/// outcome is observed by every successor of a shared completion.
#[derive(Debug, Clone, Error)]
pub enum CatenaError {
  #[error("Illegal state: {0}")]
  IllegalState(String),

  #[error("Illegal argument: {0}")]
  IllegalArgument(String),

  #[error("Execution failed: {0}")]
  Execution(WorkFailure),

  /// The operation intentionally did not run.
  #[error("Operation skipped: {reason}")]
  Skipped { reason: String },

  #[error("Operation {operation} timed out after {millis} ms")]
  Timeout { operation: u64, millis: u128 },

  #[error("Internal catena error: {0}")]
  Internal(String),
}

impl CatenaError {
  pub(crate) fn illegal_state(message: impl Into<String>) -> Self {
    CatenaError::IllegalState(message.into())
  }

  pub(crate) fn illegal_argument(message: impl Into<String>) -> Self {
    CatenaError::IllegalArgument(message.into())
  }

  pub(crate) fn skipped(reason: impl Into<String>) -> Self {
    CatenaError::Skipped { reason: reason.into() }
  }

  pub fn is_skip(&self) -> bool {
    matches!(self, CatenaError::Skipped { .. })
  }

  /// Diagnostic record if this is a failure of the work itself.
  pub fn work_failure(&self) -> Option<&WorkFailure> {
    match self {
      CatenaError::Execution(failure) => Some(failure),
      _ => None,
    }
  }
}

impl From<WorkFailure> for CatenaError {
  fn from(failure: WorkFailure) -> Self {
    CatenaError::Execution(failure)
  }
}

// Ad-hoc errors from actions become execution failures. An anyhow error that
// already wraps a CatenaError keeps its original variant.
impl From<AnyhowError> for CatenaError {
  fn from(err: AnyhowError) -> Self {
    match err.downcast::<CatenaError>() {
      Ok(catena_err) => catena_err,
      Err(err) => match err.downcast::<WorkFailure>() {
        Ok(failure) => CatenaError::Execution(failure),
        Err(err) => CatenaError::Execution(WorkFailure::new(format!("{:#}", err))),
      },
    }
  }
}

pub type CatenaResult<T, E = CatenaError> = std::result::Result<T, E>;
