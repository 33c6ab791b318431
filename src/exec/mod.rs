//! Execution control
//!
//! Turns logical tool invocations into supervised child processes.

pub mod invoker;
pub mod strategy;
pub mod translate;
