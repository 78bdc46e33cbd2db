// tests/common/mod.rs
#![allow(dead_code)] // Allow unused code in this common test module

use catena::{CatenaResult, Driver, Session, SqlValue, Statement, StatementOutcome, WorkFailure};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::{
  atomic::{AtomicUsize, Ordering},
  Arc,
};
use std::time::Duration;
use tracing::Level;

// --- Recording Driver ---

/// One statement as the driver saw it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedStatement {
  pub sql: String,
  pub parameters: BTreeMap<String, SqlValue>,
  pub out_parameters: Vec<String>,
}

/// A driver that records every call and answers with scripted responses.
/// Statements without a script succeed with one affected row.
#[derive(Default)]
pub struct RecordingDriver {
  executed: Mutex<Vec<ExecutedStatement>>,
  transactions: Mutex<Vec<bool>>,
  scripted: Mutex<HashMap<String, Result<StatementOutcome, WorkFailure>>>,
}

impl RecordingDriver {
  pub fn new() -> Arc<Self> {
    Arc::new(Self::default())
  }

  pub fn respond_with(&self, sql: &str, outcome: StatementOutcome) {
    self.scripted.lock().insert(sql.to_string(), Ok(outcome));
  }

  pub fn fail_on(&self, sql: &str, failure: WorkFailure) {
    self.scripted.lock().insert(sql.to_string(), Err(failure));
  }

  pub fn executed(&self) -> Vec<ExecutedStatement> {
    self.executed.lock().clone()
  }

  pub fn executed_sql(&self) -> Vec<String> {
    self.executed.lock().iter().map(|s| s.sql.clone()).collect()
  }

  /// `true` for each commit, `false` for each rollback, in call order.
  pub fn transactions(&self) -> Vec<bool> {
    self.transactions.lock().clone()
  }
}

impl Driver for RecordingDriver {
  fn execute(&self, statement: &Statement<'_>) -> Result<StatementOutcome, WorkFailure> {
    self.executed.lock().push(ExecutedStatement {
      sql: statement.sql.to_string(),
      parameters: statement.parameters.clone(),
      out_parameters: statement.out_parameters.keys().cloned().collect(),
    });
    tracing::debug!(target: "test_driver", sql = statement.sql, "statement recorded");
    match self.scripted.lock().get(statement.sql) {
      Some(response) => response.clone(),
      None => Ok(StatementOutcome::rows(1)),
    }
  }

  fn end_transaction(&self, commit: bool) -> Result<(), WorkFailure> {
    self.transactions.lock().push(commit);
    Ok(())
  }
}

// --- Session Helpers ---

pub fn session() -> Session {
  Session::builder()
    .name("test-session")
    .build()
    .expect("tests run inside a tokio runtime")
}

pub fn session_with(driver: &Arc<RecordingDriver>) -> Session {
  Session::builder()
    .name("test-session")
    .shared_driver(driver.clone())
    .build()
    .expect("tests run inside a tokio runtime")
}

// --- Execution Log ---

/// Records the order in which member actions started.
#[derive(Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<String>>>);

impl ExecutionLog {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn record(&self, entry: impl Into<String>) {
    self.0.lock().push(entry.into());
  }

  pub fn entries(&self) -> Vec<String> {
    self.0.lock().clone()
  }
}

/// An already-decided group condition.
pub async fn resolved(value: bool) -> CatenaResult<bool> {
  Ok(value)
}

/// Resolves `future` or reports that it is still pending after `wait`.
pub async fn pending_after<F: std::future::Future>(future: F, wait: Duration) -> bool {
  tokio::time::timeout(wait, future).await.is_err()
}

// --- Helper for Tracing Setup (call once per test run if needed) ---
use once_cell::sync::Lazy;
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer() // Important for tests to capture output
    .try_init()
    .ok(); // Allow multiple initializations in tests (ok if fails)
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Atomic counters for checking execution counts ---
pub static ACTION_EXEC_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));
pub static ERROR_HANDLER_COUNTER: Lazy<Arc<AtomicUsize>> = Lazy::new(|| Arc::new(AtomicUsize::new(0)));

pub fn reset_counters() {
  ACTION_EXEC_COUNTER.store(0, Ordering::SeqCst);
  ERROR_HANDLER_COUNTER.store(0, Ordering::SeqCst);
}

pub fn actions_run() -> usize {
  ACTION_EXEC_COUNTER.load(Ordering::SeqCst)
}
