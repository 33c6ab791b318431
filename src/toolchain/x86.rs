use crate::config::settings::ToolchainConfig;
use crate::config::types::Operand;
use crate::exec::strategy::{CommandStep, ToolInvocation};
use crate::toolchain::ToolchainAdapter;
use std::path::{Path, PathBuf};

/// Source-to-x86 compiler followed by a GNU-style assembler/linker.
///
/// `compiler <source>` writes `<stem>.<assembly_extension>` next to the
/// source; `assembler <asm> <flags..> -o <stem>.<binary_extension>` links it
/// and the binary is executed straight after.
#[derive(Debug, Clone)]
pub struct X86Toolchain {
    config: ToolchainConfig,
    compiler: PathBuf,
}

impl X86Toolchain {
    pub fn new(config: ToolchainConfig) -> Self {
        let compiler = config.compiler_path();
        Self { config, compiler }
    }
}

impl ToolchainAdapter for X86Toolchain {
    fn name(&self) -> &'static str {
        "x86-gnu"
    }

    fn root(&self) -> &Path {
        &self.config.root
    }

    fn source_file_name(&self) -> &str {
        &self.config.source_file
    }

    fn assembly_path(&self, source: &Path) -> PathBuf {
        source.with_extension(&self.config.assembly_extension)
    }

    fn binary_path(&self, assembly: &Path) -> PathBuf {
        assembly.with_extension(&self.config.binary_extension)
    }

    fn compile_invocation(&self, source: &Path) -> ToolInvocation {
        ToolInvocation::single(
            "Compiler",
            CommandStep::new(Operand::path(&self.compiler)).arg(Operand::path(source)),
            self.config.root.clone(),
        )
    }

    fn assemble_and_run_invocation(&self, assembly: &Path, binary: &Path) -> ToolInvocation {
        let mut link = CommandStep::new(Operand::literal(&self.config.assembler))
            .arg(Operand::path(assembly));
        for flag in &self.config.assembler_flags {
            link = link.arg(Operand::literal(flag));
        }
        link = link.arg(Operand::literal("-o")).arg(Operand::path(binary));

        ToolInvocation::chain(
            "Runner",
            vec![link, CommandStep::new(Operand::path(binary))],
            self.config.root.clone(),
        )
    }
}
