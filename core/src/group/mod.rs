// catena/src/group/mod.rs

//! Operation groups: composite operations that chain their members and
//! reduce member results into a group result.

pub(crate) mod chain;
pub mod collector;
pub mod config;
pub mod definition;
pub mod execution;

pub use collector::Collector;
pub use config::{FreezeCause, GroupPhase, GroupSetting};
pub use definition::OperationGroup;
