//! Compile-and-execute pipeline
//!
//! - [`request`]: validated source submission
//! - [`compile`]: source to assembly
//! - [`run`]: assembly to binary to program output
//! - [`orchestrator`]: stage sequencing, result assembly and teardown
//! - [`wire`]: JSON request/response compatibility layer

pub mod compile;
pub mod orchestrator;
pub mod request;
pub mod run;
pub mod wire;

pub use orchestrator::{Pipeline, PipelineResult, PipelineState, RunStatus};
pub use request::CompileRequest;
