//! Compile stage: source text in, assembly text out.

use crate::config::types::Result;
use crate::exec::invoker::ProcessInvoker;
use crate::safety::workspace::Workspace;
use crate::toolchain::ToolchainAdapter;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// An assembly artifact that was present on disk when the compile stage
/// finished. Only this module can produce one, so the run stage is never
/// handed a path the compiler did not write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyFile {
    path: PathBuf,
}

impl AssemblyFile {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[derive(Debug, Clone)]
pub struct CompileOutput {
    /// Produced assembly, empty when the compiler wrote none
    pub assembly: String,
    pub assembly_file: Option<AssemblyFile>,
    pub wall_time: Duration,
}

/// Write the source into the workspace, run the compiler on it and read back
/// the sibling assembly file.
///
/// A non-zero compiler exit is returned as-is, diagnostic text untouched. A
/// successful exit without an assembly file degrades to empty assembly.
pub async fn compile(
    invoker: &ProcessInvoker,
    toolchain: &dyn ToolchainAdapter,
    workspace: &Workspace,
    source: &str,
    timeout: Duration,
) -> Result<CompileOutput> {
    let source_path = workspace
        .write_artifact(toolchain.source_file_name(), source)
        .await?;

    let invocation = toolchain.compile_invocation(&source_path);
    let output = invoker.run(&invocation, timeout).await?;

    let asm_path = toolchain.assembly_path(&source_path);
    let (assembly, assembly_file) = match tokio::fs::read(&asm_path).await {
        Ok(bytes) => (
            String::from_utf8_lossy(&bytes).into_owned(),
            Some(AssemblyFile { path: asm_path }),
        ),
        Err(e) => {
            if e.kind() == ErrorKind::NotFound {
                log::info!("Compiler produced no assembly at {}", asm_path.display());
            } else {
                log::warn!("Failed to read assembly {}: {}", asm_path.display(), e);
            }
            (String::new(), None)
        }
    };

    Ok(CompileOutput {
        assembly,
        assembly_file,
        wall_time: output.wall_time,
    })
}
