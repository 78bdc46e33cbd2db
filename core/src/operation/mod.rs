// catena/src/operation/mod.rs

//! Leaf member kinds.

pub mod local;
pub mod statement;

pub use local::LocalOperation;
pub use statement::StatementOperation;
