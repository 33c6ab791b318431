//! Assemble-and-run stage: link the assembly, then execute the binary.

use crate::config::types::{OutputIntegrity, Result};
use crate::exec::invoker::ProcessInvoker;
use crate::pipeline::compile::AssemblyFile;
use crate::toolchain::ToolchainAdapter;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RunOutput {
    /// Program stdout, raw
    pub stdout: String,
    pub integrity: OutputIntegrity,
    pub wall_time: Duration,
}

/// Link `assembly` into a sibling binary and run it as one chained
/// invocation, so a link failure prevents execution.
pub async fn assemble_and_run(
    invoker: &ProcessInvoker,
    toolchain: &dyn ToolchainAdapter,
    assembly: &AssemblyFile,
    timeout: Duration,
) -> Result<RunOutput> {
    let binary = toolchain.binary_path(assembly.path());
    let invocation = toolchain.assemble_and_run_invocation(assembly.path(), &binary);
    let output = invoker.run(&invocation, timeout).await?;

    Ok(RunOutput {
        stdout: output.stdout,
        integrity: output.stdout_integrity,
        wall_time: output.wall_time,
    })
}
