pub mod completion;
pub mod executor;
pub mod lifecycle;
pub mod operation;

// Re-export key types for easier access from other catena modules (and lib.rs)
pub use completion::{Completion, Outcome};
pub use executor::ExecutionPolicy;
pub use lifecycle::OperationLifecycle;
pub use operation::{Action, ErrorHandler, Operation, OperationContext, OperationCore, OperationId};
