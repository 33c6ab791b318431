//! Toolchain adapters.
//!
//! The pipeline stays toolchain-agnostic. An adapter names the artifacts of a
//! run and describes the compile and assemble-and-run invocations; the
//! invocation strategy decides how those are launched on this host.

pub mod x86;

use crate::exec::strategy::ToolInvocation;
use std::path::{Path, PathBuf};

pub use x86::X86Toolchain;

/// Contract for the compile and assemble-and-run stages of one toolchain
pub trait ToolchainAdapter: Send + Sync + std::fmt::Debug {
    fn name(&self) -> &'static str;
    /// Read-only installation root shared by all requests
    fn root(&self) -> &Path;
    /// Fixed file name the source is written to inside a workspace
    fn source_file_name(&self) -> &str;
    /// Where the compiler leaves its assembly for a given source file
    fn assembly_path(&self, source: &Path) -> PathBuf;
    /// Where the assembler/linker writes the binary for a given assembly file
    fn binary_path(&self, assembly: &Path) -> PathBuf;
    fn compile_invocation(&self, source: &Path) -> ToolInvocation;
    fn assemble_and_run_invocation(&self, assembly: &Path, binary: &Path) -> ToolInvocation;
}
