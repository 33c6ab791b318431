//! compilebox: compile-and-execute orchestration for external toolchains
//!
//! Submits source text to an external compiler, links the assembly it
//! produces, runs the binary and returns the assembly together with the
//! program's output. Every request gets its own disposable workspace.
//!
//! # Architecture
//!
//! ## Configuration ([`config`])
//! - [`config::types`]: Error taxonomy, host environment, shared enums
//! - [`config::settings`]: `compilebox.json` loading and validation
//!
//! ## Execution Control ([`exec`])
//! - [`exec::translate`]: Host-to-guest path translation
//! - [`exec::strategy`]: Direct and delegated invocation strategies
//! - [`exec::invoker`]: Async process launch with timeouts and group kill
//!
//! ## Toolchains ([`toolchain`])
//! - [`toolchain::ToolchainAdapter`]: Artifact naming and stage invocations
//! - [`toolchain::x86`]: Compiler plus GNU-style assembler/linker
//!
//! ## Pipeline ([`pipeline`])
//! - [`pipeline::compile`]: Source to assembly
//! - [`pipeline::run`]: Assembly to binary to program output
//! - [`pipeline::orchestrator`]: Stage sequencing and guaranteed teardown
//! - [`pipeline::wire`]: JSON request/response compatibility layer
//!
//! ## Safety & Cleanup ([`safety`])
//! - [`safety::workspace`]: Per-request scoped workspaces
//! - [`safety::cleanup`]: Confined, idempotent tree removal
//!
//! ## Observability ([`observability`])
//! - [`observability::events`]: Structured pipeline events
//!
//! ## Utilities ([`utils`])
//! - [`utils::output`]: Bounded output collection
//!
//! # Error handling
//!
//! Only two outcomes reach the caller as failures: an empty source (rejected
//! before anything is allocated) and a compiler failure (its diagnostic,
//! verbatim). Anything that goes wrong after a successful compile degrades
//! to empty program output, and workspace cleanup never fails a request.

// Configuration
pub mod config;

// Execution Control
pub mod exec;

// Toolchain adapters
pub mod toolchain;

// Compile-and-execute pipeline
pub mod pipeline;

// Safety & Cleanup
pub mod safety;

// Observability
pub mod observability;

// Utilities
pub mod utils;

// CLI
pub mod cli;

pub use config::settings::PipelineConfig;
pub use config::types::{HostEnvironment, PipelineError, Result};
pub use pipeline::{CompileRequest, Pipeline, PipelineResult, PipelineState, RunStatus};
