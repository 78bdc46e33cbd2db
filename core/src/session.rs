// catena/src/session.rs

//! The execution context operations run against, and its builder.

use crate::driver::{Driver, NoopDriver};
use crate::error::{CatenaError, CatenaResult};
use crate::group::chain::{GroupChain, MemberSlot};
use crate::group::OperationGroup;
use crate::operation::{LocalOperation, StatementOperation};
use crate::transaction::{TransactionCompletion, TransactionOutcome};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{event, Level};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
  pub(crate) fn next() -> Self {
    SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
  }
}

impl fmt::Display for SessionId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "session-{}", self.0)
  }
}

/// Settings applied to every operation created through a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
  /// Shown in logs.
  pub name: String,
  /// Initial timeout of every new operation; `None` means unbounded.
  pub default_timeout: Option<Duration>,
}

impl Default for SessionConfig {
  fn default() -> Self {
    Self {
      name: "catena".to_string(),
      default_timeout: None,
    }
  }
}

/// What every group and operation of a session shares.
pub(crate) struct ExecutionContext {
  pub(crate) id: SessionId,
  pub(crate) config: SessionConfig,
  pub(crate) driver: Arc<dyn Driver>,
  pub(crate) runtime: Handle,
}

impl fmt::Debug for ExecutionContext {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ExecutionContext")
      .field("id", &self.id)
      .field("config", &self.config)
      .finish()
  }
}

/// Builder for [`Session`].
#[derive(Default)]
pub struct SessionBuilder {
  config: SessionConfig,
  driver: Option<Arc<dyn Driver>>,
  runtime: Option<Handle>,
}

impl SessionBuilder {
  pub fn driver(mut self, driver: impl Driver) -> Self {
    self.driver = Some(Arc::new(driver));
    self
  }

  pub fn shared_driver(mut self, driver: Arc<dyn Driver>) -> Self {
    self.driver = Some(driver);
    self
  }

  /// Runtime whose blocking pool runs member actions. Defaults to the
  /// runtime `build` is called from.
  pub fn executor(mut self, runtime: Handle) -> Self {
    self.runtime = Some(runtime);
    self
  }

  pub fn config(mut self, config: SessionConfig) -> Self {
    self.config = config;
    self
  }

  pub fn name(mut self, name: impl Into<String>) -> Self {
    self.config.name = name.into();
    self
  }

  pub fn default_timeout(mut self, timeout: Duration) -> Self {
    self.config.default_timeout = Some(timeout);
    self
  }

  pub fn build(self) -> CatenaResult<Session> {
    let runtime = match self.runtime {
      Some(runtime) => runtime,
      None => Handle::try_current()
        .map_err(|e| CatenaError::illegal_state(format!("no executor configured and no current runtime: {}", e)))?,
    };
    let context = Arc::new(ExecutionContext {
      id: SessionId::next(),
      config: self.config,
      driver: self.driver.unwrap_or_else(|| Arc::new(NoopDriver)),
      runtime,
    });
    event!(Level::DEBUG, session = %context.id, name = %context.config.name, "Session created.");
    Ok(Session {
      root: GroupChain::root(context.clone()),
      context,
    })
  }
}

/// A session: the ordered resource every operation runs against.
///
/// The session is itself the outermost group. Its members run strictly in
/// submission order, and its start gate is open from creation.
#[derive(Clone)]
pub struct Session {
  context: Arc<ExecutionContext>,
  root: Arc<GroupChain>,
}

impl fmt::Debug for Session {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Session")
      .field("id", &self.context.id)
      .field("name", &self.context.config.name)
      .field("closed", &self.is_closed())
      .finish()
  }
}

impl Session {
  pub fn builder() -> SessionBuilder {
    SessionBuilder::default()
  }

  pub fn id(&self) -> SessionId {
    self.context.id
  }

  pub fn config(&self) -> &SessionConfig {
    &self.context.config
  }

  pub fn is_closed(&self) -> bool {
    self.root.is_closed()
  }

  /// Stops accepting new operations. Operations already submitted still run.
  pub fn close(&self) -> CatenaResult<()> {
    self.root.close()?;
    event!(Level::DEBUG, session = %self.context.id, "Session closed.");
    Ok(())
  }

  /// Starts a new transaction owned by this session.
  pub fn transaction_completion(&self) -> TransactionCompletion {
    TransactionCompletion::new(self.context.id)
  }

  pub fn operation_group<S, T>(&self) -> CatenaResult<OperationGroup<S, T>>
  where
    S: Clone + Send + Sync + 'static,
    T: Clone + Send + Sync + 'static,
  {
    self.root.register_member()?;
    Ok(OperationGroup::nested(self.root.clone(), None))
  }

  pub fn local_operation<R>(&self) -> CatenaResult<LocalOperation<R>>
  where
    R: Clone + Send + Sync + 'static,
  {
    Ok(self.slot()?.local())
  }

  pub fn catch_operation<R>(&self) -> CatenaResult<LocalOperation<R>>
  where
    R: Clone + Default + Send + Sync + 'static,
  {
    Ok(self.slot()?.catch())
  }

  pub fn operation<R>(&self, sql: &str) -> CatenaResult<StatementOperation<R>>
  where
    R: Clone + Send + Sync + 'static,
  {
    self.root.assert_open()?;
    let sql = crate::operation::statement::checked_sql(sql)?;
    Ok(self.slot()?.statement(sql))
  }

  pub fn end_transaction_operation<R>(&self, transaction: &TransactionCompletion) -> CatenaResult<LocalOperation<R>>
  where
    R: Clone + From<TransactionOutcome> + Send + Sync + 'static,
  {
    self.root.assert_open()?;
    crate::operation::local::check_owner(transaction, self.context.id)?;
    Ok(self.slot()?.end_transaction(transaction))
  }

  fn slot<R>(&self) -> CatenaResult<MemberSlot<R>>
  where
    R: Clone + Send + Sync + 'static,
  {
    self.root.register_member()?;
    Ok(MemberSlot::new(self.root.clone(), None))
  }
}
