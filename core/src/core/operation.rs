// catena/src/core/operation.rs

//! Shared per-operation state and the `Operation` trait every member exposes.

use crate::core::lifecycle::OperationLifecycle;
use crate::error::{CatenaError, CatenaResult};
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{event, Level};

static NEXT_OPERATION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OperationId(u64);

impl OperationId {
  fn next() -> Self {
    OperationId(NEXT_OPERATION_ID.fetch_add(1, Ordering::Relaxed))
  }

  pub fn as_u64(self) -> u64 {
    self.0
  }
}

impl fmt::Display for OperationId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "op-{}", self.0)
  }
}

/// Observation-only callback invoked with an operation's failure.
pub type ErrorHandler = Arc<dyn Fn(&CatenaError) + Send + Sync + 'static>;

/// The synchronous unit of work performed by a leaf operation.
///
/// Invoked at most once, on the session's execution resource, never inline on
/// the thread that triggered the chain.
pub type Action<T> = Box<dyn FnOnce(&OperationContext) -> CatenaResult<T> + Send + 'static>;

struct OperationState {
  lifecycle: OperationLifecycle,
  timeout: Option<Duration>,
  error_handler: Option<ErrorHandler>,
}

/// State shared between an operation's handle, its submission and the
/// future that executes it.
pub struct OperationCore {
  id: OperationId,
  kind: &'static str,
  state: Mutex<OperationState>,
}

impl fmt::Debug for OperationCore {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let state = self.state.lock();
    f.debug_struct("OperationCore")
      .field("id", &self.id)
      .field("kind", &self.kind)
      .field("lifecycle", &state.lifecycle)
      .field("timeout", &state.timeout)
      .field("error_handler_present", &state.error_handler.is_some())
      .finish()
  }
}

impl OperationCore {
  pub(crate) fn new(kind: &'static str, default_timeout: Option<Duration>) -> Arc<Self> {
    Arc::new(Self {
      id: OperationId::next(),
      kind,
      state: Mutex::new(OperationState {
        lifecycle: OperationLifecycle::New,
        timeout: default_timeout,
        error_handler: None,
      }),
    })
  }

  pub fn id(&self) -> OperationId {
    self.id
  }

  pub fn kind(&self) -> &'static str {
    self.kind
  }

  pub fn lifecycle(&self) -> OperationLifecycle {
    self.state.lock().lifecycle
  }

  pub fn is_canceled(&self) -> bool {
    self.lifecycle() == OperationLifecycle::Canceled
  }

  pub(crate) fn timeout(&self) -> Option<Duration> {
    self.state.lock().timeout
  }

  pub(crate) fn assert_unsubmitted(&self) -> CatenaResult<()> {
    let lifecycle = self.lifecycle();
    if lifecycle.is_submitted() {
      return Err(CatenaError::illegal_state(format!(
        "{} {} is immutable ({:?})",
        self.kind, self.id, lifecycle
      )));
    }
    Ok(())
  }

  pub(crate) fn set_timeout(&self, timeout: Duration) -> CatenaResult<()> {
    if timeout.is_zero() {
      return Err(CatenaError::illegal_argument("timeout must be positive"));
    }
    let mut state = self.state.lock();
    if state.lifecycle.is_submitted() {
      return Err(CatenaError::illegal_state(format!("{} {} is immutable", self.kind, self.id)));
    }
    state.timeout = Some(timeout);
    Ok(())
  }

  pub(crate) fn set_error_handler(&self, handler: ErrorHandler) -> CatenaResult<()> {
    let mut state = self.state.lock();
    if state.lifecycle.is_submitted() {
      return Err(CatenaError::illegal_state(format!("{} {} is immutable", self.kind, self.id)));
    }
    state.error_handler = Some(handler);
    Ok(())
  }

  /// `New -> Submitted` for leaves, `New -> Held` for groups.
  pub(crate) fn mark_submitted(&self, as_group: bool) -> CatenaResult<()> {
    let mut state = self.state.lock();
    if state.lifecycle.is_submitted() {
      return Err(CatenaError::illegal_state(format!(
        "{} {} already submitted ({:?})",
        self.kind, self.id, state.lifecycle
      )));
    }
    let next = if as_group {
      OperationLifecycle::Held
    } else {
      OperationLifecycle::Submitted
    };
    state.lifecycle = state.lifecycle.transition(next)?;
    Ok(())
  }

  /// Checked at the top of every execution step. A canceled operation fails
  /// fast with a skip instead of running.
  pub(crate) fn begin_execution(&self) -> CatenaResult<()> {
    let mut state = self.state.lock();
    match state.lifecycle {
      OperationLifecycle::Canceled => Err(self.canceled_error()),
      current => {
        state.lifecycle = current.transition(OperationLifecycle::Executing)?;
        Ok(())
      }
    }
  }

  pub(crate) fn canceled_error(&self) -> CatenaError {
    CatenaError::skipped(format!("{} {} was canceled", self.kind, self.id))
  }

  /// Moves a non-terminal operation to `Completed`. Terminal states are kept.
  pub(crate) fn settle(&self) {
    let mut state = self.state.lock();
    if let Ok(next) = state.lifecycle.transition(OperationLifecycle::Completed) {
      state.lifecycle = next;
    }
  }

  /// Best-effort cancellation. Returns `true` if the operation had not started
  /// executing and is now canceled.
  pub(crate) fn cancel(&self) -> bool {
    let mut state = self.state.lock();
    match state.lifecycle.transition(OperationLifecycle::Canceled) {
      Ok(next) => {
        state.lifecycle = next;
        event!(Level::DEBUG, operation = %self.id, kind = self.kind, "Operation canceled.");
        true
      }
      Err(_) => false,
    }
  }

  /// Hands `err` to the registered error handler, if any.
  pub(crate) fn notify_error(&self, err: &CatenaError) {
    let handler = self.state.lock().error_handler.clone();
    if let Some(handler) = handler {
      event!(Level::TRACE, operation = %self.id, error = %err, "Invoking error handler.");
      handler(err);
    }
  }
}

/// What a running action can see of its own operation.
pub struct OperationContext {
  core: Arc<OperationCore>,
}

impl OperationContext {
  pub(crate) fn new(core: Arc<OperationCore>) -> Self {
    Self { core }
  }

  pub fn id(&self) -> OperationId {
    self.core.id()
  }

  pub fn kind(&self) -> &'static str {
    self.core.kind()
  }
}

/// Configuration and control shared by every kind of operation.
///
/// Configuration calls are legal only while the operation is `New`; afterwards
/// they fail with `IllegalState`.
pub trait Operation {
  /// Shared state behind this handle.
  fn core(&self) -> &Arc<OperationCore>;

  fn id(&self) -> OperationId {
    self.core().id()
  }

  fn lifecycle(&self) -> OperationLifecycle {
    self.core().lifecycle()
  }

  /// Bounds how long the operation may execute once it started.
  fn timeout(&self, timeout: Duration) -> CatenaResult<&Self>
  where
    Self: Sized,
  {
    self.core().set_timeout(timeout)?;
    Ok(self)
  }

  /// Registers an observer for this operation's failure. The failure still
  /// propagates through the chain.
  fn on_error<F>(&self, handler: F) -> CatenaResult<&Self>
  where
    Self: Sized,
    F: Fn(&CatenaError) + Send + Sync + 'static,
  {
    self.core().set_error_handler(Arc::new(handler))?;
    Ok(self)
  }

  /// Requests cancellation. Never blocks and never interrupts running work.
  fn cancel(&self) -> bool {
    self.core().cancel()
  }
}
