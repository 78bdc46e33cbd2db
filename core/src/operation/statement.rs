// catena/src/operation/statement.rs

//! Members that execute statement text through the session's driver.

use crate::core::completion::Signal;
use crate::core::executor::ExecutionPolicy;
use crate::core::operation::{Action, Operation, OperationContext, OperationCore};
use crate::driver::{SqlType, SqlValue, Statement, StatementOutcome};
use crate::error::{CatenaError, CatenaResult};
use crate::group::chain::MemberSlot;
use crate::submission::Submission;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{event, Level};

type Processor<S> = Box<dyn FnOnce(StatementOutcome) -> CatenaResult<S> + Send + 'static>;
type DeferredValue = BoxFuture<'static, CatenaResult<SqlValue>>;

#[derive(Default)]
struct Parameters {
  values: BTreeMap<String, SqlValue>,
  deferred: Vec<(String, DeferredValue)>,
  out: BTreeMap<String, SqlType>,
}

impl Parameters {
  fn is_bound(&self, id: &str) -> bool {
    self.values.contains_key(id) || self.deferred.iter().any(|(bound, _)| bound == id)
  }
}

pub(crate) fn checked_sql(sql: &str) -> CatenaResult<String> {
  if sql.trim().is_empty() {
    return Err(CatenaError::illegal_argument("statement text must not be empty"));
  }
  Ok(sql.to_string())
}

fn checked_id(id: &str) -> CatenaResult<()> {
  if id.trim().is_empty() {
    return Err(CatenaError::illegal_argument("parameter id must not be empty"));
  }
  Ok(())
}

/// A member that runs `sql` with bound parameters and converts the driver's
/// [`StatementOutcome`] into the member value with the processor given to
/// [`StatementOperation::apply`].
pub struct StatementOperation<S>
where
  S: Clone + Send + Sync + 'static,
{
  core: Arc<OperationCore>,
  slot: MemberSlot<S>,
  sql: String,
  parameters: Mutex<Parameters>,
  processor: Mutex<Option<Processor<S>>>,
}

impl<S> fmt::Debug for StatementOperation<S>
where
  S: Clone + Send + Sync + 'static,
{
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let parameters = self.parameters.lock();
    f.debug_struct("StatementOperation")
      .field("core", &self.core)
      .field("sql", &self.sql)
      .field("parameters", &parameters.values)
      .field("deferred_parameters", &parameters.deferred.len())
      .field("out_parameters", &parameters.out)
      .finish()
  }
}

impl<S> StatementOperation<S>
where
  S: Clone + Send + Sync + 'static,
{
  pub fn sql(&self) -> &str {
    &self.sql
  }

  /// Binds `value` to parameter `id`.
  pub fn set(&self, id: &str, value: impl Into<SqlValue>) -> CatenaResult<&Self> {
    checked_id(id)?;
    self.core.assert_unsubmitted()?;
    let mut parameters = self.parameters.lock();
    if parameters.is_bound(id) {
      return Err(CatenaError::illegal_state(format!("parameter '{}' already set", id)));
    }
    parameters.values.insert(id.to_string(), value.into());
    Ok(self)
  }

  /// Binds parameter `id` to a value that becomes available later. The
  /// statement waits for it after its predecessor completes; if it fails, the
  /// statement fails with that error.
  pub fn set_deferred<F>(&self, id: &str, value: F) -> CatenaResult<&Self>
  where
    F: Future<Output = CatenaResult<SqlValue>> + Send + 'static,
  {
    checked_id(id)?;
    self.core.assert_unsubmitted()?;
    let mut parameters = self.parameters.lock();
    if parameters.is_bound(id) {
      return Err(CatenaError::illegal_state(format!("parameter '{}' already set", id)));
    }
    parameters.deferred.push((id.to_string(), value.boxed()));
    Ok(self)
  }

  /// Declares an out parameter the driver must report back.
  pub fn out_parameter(&self, id: &str, sql_type: SqlType) -> CatenaResult<&Self> {
    checked_id(id)?;
    self.core.assert_unsubmitted()?;
    let mut parameters = self.parameters.lock();
    if parameters.out.contains_key(id) {
      return Err(CatenaError::illegal_state(format!("out parameter '{}' already declared", id)));
    }
    parameters.out.insert(id.to_string(), sql_type);
    Ok(self)
  }

  /// Sets how the driver's outcome becomes the member value. Required.
  pub fn apply<F>(&self, processor: F) -> CatenaResult<&Self>
  where
    F: FnOnce(StatementOutcome) -> CatenaResult<S> + Send + 'static,
  {
    self.core.assert_unsubmitted()?;
    *self.processor.lock() = Some(Box::new(processor));
    Ok(self)
  }

  /// Chains the statement. Parameters are taken only once the group has
  /// accepted it, so a rejected submit leaves the operation as it was.
  pub fn submit(&self) -> CatenaResult<Submission<S>> {
    let reservation = self.slot.chain.reserve(&self.core)?;
    let processor = self
      .processor
      .lock()
      .take()
      .ok_or_else(|| CatenaError::illegal_state(format!("{} has no result processor; call apply()", self.core.id())))?;
    let Parameters { values, deferred, out } = std::mem::take(&mut *self.parameters.lock());

    let context = self.slot.context().clone();
    let sql = self.sql.clone();
    let core = self.core.clone();
    let values = Arc::new(Mutex::new(values));

    let follows = move |predecessor: Signal| {
      let predecessor = if deferred.is_empty() {
        predecessor
      } else {
        attach_deferred(predecessor, deferred, values.clone())
      };
      let driver = context.driver.clone();
      let action: Action<S> = Box::new(move |op: &OperationContext| {
        let parameters = values.lock().clone();
        event!(Level::DEBUG, operation = %op.id(), sql = %sql, parameters = parameters.len(), "Executing statement.");
        let statement = Statement {
          sql: &sql,
          parameters: &parameters,
          out_parameters: &out,
        };
        let outcome = driver
          .execute(&statement)
          .map_err(|failure| CatenaError::Execution(failure.or_sql(&sql)))?;
        processor(outcome)
      });
      ExecutionPolicy::Skippable.follows(predecessor, core, action, context.runtime.clone())
    };

    let link = self.slot.link(true);
    let completion = reservation.link(link, follows)?;
    Ok(Submission::new(self.core.clone(), completion))
  }
}

/// Waits for the predecessor, then resolves deferred parameters into `values`.
fn attach_deferred(
  predecessor: Signal,
  deferred: Vec<(String, DeferredValue)>,
  values: Arc<Mutex<BTreeMap<String, SqlValue>>>,
) -> Signal {
  async move {
    predecessor.await?;
    for (id, value) in deferred {
      let resolved = value.await?;
      values.lock().insert(id, resolved);
    }
    Ok(())
  }
  .boxed()
  .shared()
}

impl<S> Operation for StatementOperation<S>
where
  S: Clone + Send + Sync + 'static,
{
  fn core(&self) -> &Arc<OperationCore> {
    &self.core
  }
}

impl<S> MemberSlot<S>
where
  S: Clone + Send + Sync + 'static,
{
  pub(crate) fn statement(self, sql: String) -> StatementOperation<S> {
    let core = OperationCore::new("statement", self.context().config.default_timeout);
    StatementOperation {
      core,
      slot: self,
      sql,
      parameters: Mutex::new(Parameters::default()),
      processor: Mutex::new(None),
    }
  }
}
