// catena/src/driver.rs

//! The contract between the engine and whatever actually executes statements.
//!
//! Transport, statement parsing and type marshalling live behind [`Driver`];
//! the engine only needs a value or a [`WorkFailure`] back.

use crate::error::WorkFailure;
use std::collections::BTreeMap;
use std::fmt;

/// A parameter or out-parameter value.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
  Null,
  Bool(bool),
  Int(i64),
  Float(f64),
  Text(String),
  Bytes(Vec<u8>),
}

impl SqlValue {
  pub fn as_i64(&self) -> Option<i64> {
    match self {
      SqlValue::Int(v) => Some(*v),
      _ => None,
    }
  }

  pub fn as_str(&self) -> Option<&str> {
    match self {
      SqlValue::Text(v) => Some(v),
      _ => None,
    }
  }
}

impl From<bool> for SqlValue {
  fn from(v: bool) -> Self {
    SqlValue::Bool(v)
  }
}

impl From<i64> for SqlValue {
  fn from(v: i64) -> Self {
    SqlValue::Int(v)
  }
}

impl From<i32> for SqlValue {
  fn from(v: i32) -> Self {
    SqlValue::Int(i64::from(v))
  }
}

impl From<f64> for SqlValue {
  fn from(v: f64) -> Self {
    SqlValue::Float(v)
  }
}

impl From<&str> for SqlValue {
  fn from(v: &str) -> Self {
    SqlValue::Text(v.to_string())
  }
}

impl From<String> for SqlValue {
  fn from(v: String) -> Self {
    SqlValue::Text(v)
  }
}

impl From<Vec<u8>> for SqlValue {
  fn from(v: Vec<u8>) -> Self {
    SqlValue::Bytes(v)
  }
}

impl<T: Into<SqlValue>> From<Option<T>> for SqlValue {
  fn from(v: Option<T>) -> Self {
    v.map_or(SqlValue::Null, Into::into)
  }
}

/// Declared type of an out parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
  Boolean,
  Integer,
  Double,
  Varchar,
  Binary,
}

/// Everything a driver needs to run one statement.
#[derive(Debug)]
pub struct Statement<'a> {
  pub sql: &'a str,
  pub parameters: &'a BTreeMap<String, SqlValue>,
  pub out_parameters: &'a BTreeMap<String, SqlType>,
}

/// What a driver reports back after running a statement.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatementOutcome {
  pub row_count: u64,
  pub out_values: BTreeMap<String, SqlValue>,
}

impl StatementOutcome {
  pub fn rows(row_count: u64) -> Self {
    Self {
      row_count,
      out_values: BTreeMap::new(),
    }
  }

  pub fn with_out_value(mut self, id: impl Into<String>, value: impl Into<SqlValue>) -> Self {
    self.out_values.insert(id.into(), value.into());
    self
  }

  pub fn out_value(&self, id: &str) -> Option<&SqlValue> {
    self.out_values.get(id)
  }
}

/// Executes statements on behalf of a session.
///
/// Calls are synchronous and made from the runtime's blocking pool, one
/// operation at a time per sequential chain.
pub trait Driver: Send + Sync + 'static {
  fn execute(&self, statement: &Statement<'_>) -> Result<StatementOutcome, WorkFailure>;

  /// Ends the current transaction, committing if `commit` is true.
  fn end_transaction(&self, commit: bool) -> Result<(), WorkFailure>;
}

/// A driver for sessions that only run local operations.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopDriver;

impl Driver for NoopDriver {
  fn execute(&self, statement: &Statement<'_>) -> Result<StatementOutcome, WorkFailure> {
    Err(WorkFailure::new("NoopDriver cannot execute statements").with_sql(statement.sql))
  }

  fn end_transaction(&self, _commit: bool) -> Result<(), WorkFailure> {
    Ok(())
  }
}

impl fmt::Display for SqlValue {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      SqlValue::Null => write!(f, "NULL"),
      SqlValue::Bool(v) => write!(f, "{}", v),
      SqlValue::Int(v) => write!(f, "{}", v),
      SqlValue::Float(v) => write!(f, "{}", v),
      SqlValue::Text(v) => write!(f, "'{}'", v),
      SqlValue::Bytes(v) => write!(f, "<{} bytes>", v.len()),
    }
  }
}
