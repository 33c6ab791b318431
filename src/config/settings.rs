//! Pipeline configuration loaded from `compilebox.json`.
//!
//! Every section carries serde defaults, so an empty object (or no file at
//! all) yields a working configuration rooted at `./toolchain`.

use crate::config::types::{HostEnvironment, PipelineError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_CONFIG_FILE: &str = "compilebox.json";

/// External toolchain layout and invocation conventions
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ToolchainConfig {
    /// Installation root; the compiler runs with this as working directory
    pub root: PathBuf,
    /// Compiler executable, relative paths resolve against `root`
    pub compiler: PathBuf,
    /// Fixed name of the source file written into each workspace
    pub source_file: String,
    /// Extension of the assembly the compiler writes next to the source
    pub assembly_extension: String,
    /// Extension of the linked binary written next to the assembly
    pub binary_extension: String,
    /// Assembler/linker program
    pub assembler: String,
    /// Flags placed between the assembly path and `-o <binary>`
    pub assembler_flags: Vec<String>,
    /// Shell used to chain assemble-then-run
    pub shell: String,
    pub shell_args: Vec<String>,
    /// Broker program for delegated hosts
    pub broker: String,
    /// Where host drives are mounted inside the broker's namespace
    pub guest_mount_root: String,
}

impl Default for ToolchainConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("toolchain"),
            compiler: PathBuf::from("main.exe"),
            source_file: "input.kt".to_string(),
            assembly_extension: "s".to_string(),
            binary_extension: "out".to_string(),
            assembler: "g++".to_string(),
            assembler_flags: vec!["-no-pie".to_string()],
            shell: "bash".to_string(),
            shell_args: vec!["-lc".to_string()],
            broker: "wsl".to_string(),
            guest_mount_root: "/mnt".to_string(),
        }
    }
}

impl ToolchainConfig {
    /// Compiler path with relative paths anchored at the toolchain root.
    pub fn compiler_path(&self) -> PathBuf {
        if self.compiler.is_absolute() {
            self.compiler.clone()
        } else {
            self.root.join(&self.compiler)
        }
    }

    /// Extension of the source file, used to pick inputs in batch mode.
    pub fn source_extension(&self) -> Option<&str> {
        Path::new(&self.source_file)
            .extension()
            .and_then(|ext| ext.to_str())
    }
}

/// Workspace placement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Directory that holds per-request workspaces; defaults to the toolchain root
    pub scratch_root: Option<PathBuf>,
    /// Name prefix of every workspace directory
    pub prefix: Option<String>,
}

/// Wall-clock and output limits for external invocations
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LimitsConfig {
    pub compile_timeout_ms: u64,
    pub run_timeout_ms: u64,
    pub stdout_limit_bytes: usize,
    pub stderr_limit_bytes: usize,
    /// How long to keep reading pipes after the child exits
    pub drain_timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            compile_timeout_ms: 10_000,
            run_timeout_ms: 10_000,
            stdout_limit_bytes: 8 * 1024 * 1024,
            stderr_limit_bytes: 2 * 1024 * 1024,
            drain_timeout_ms: 2_000,
        }
    }
}

impl LimitsConfig {
    pub fn compile_timeout(&self) -> Duration {
        Duration::from_millis(self.compile_timeout_ms)
    }

    pub fn run_timeout(&self) -> Duration {
        Duration::from_millis(self.run_timeout_ms)
    }

    pub fn drain_timeout(&self) -> Duration {
        Duration::from_millis(self.drain_timeout_ms)
    }
}

/// Full compilebox.json structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub toolchain: ToolchainConfig,
    pub workspace: WorkspaceConfig,
    pub host: HostEnvironment,
    pub limits: LimitsConfig,
}

impl PipelineConfig {
    /// Load configuration from a JSON file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;

        let config: PipelineConfig = serde_json::from_str(&content)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config JSON: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Load `./compilebox.json` when present, built-in defaults otherwise
    pub fn load_default() -> Result<Self> {
        let config_path = std::env::current_dir()
            .map_err(|e| PipelineError::Config(format!("Failed to get current directory: {}", e)))?
            .join(DEFAULT_CONFIG_FILE);

        if !config_path.exists() {
            log::debug!("{} not found, using built-in defaults", DEFAULT_CONFIG_FILE);
            return Ok(Self::default());
        }

        Self::load_from_file(config_path)
    }

    /// Configuration rooted at a given toolchain directory, defaults elsewhere
    pub fn for_toolchain_root(root: impl Into<PathBuf>) -> Self {
        let mut config = Self::default();
        config.toolchain.root = root.into();
        config
    }

    /// Anchor the toolchain root and an explicit scratch root at the current
    /// directory. Tools run inside their workspace, so every path handed to
    /// them must be absolute.
    pub fn resolve_paths(&mut self) -> Result<()> {
        self.toolchain.root = absolute(&self.toolchain.root)?;
        if let Some(scratch) = &self.workspace.scratch_root {
            self.workspace.scratch_root = Some(absolute(scratch)?);
        }
        Ok(())
    }

    pub fn scratch_root(&self) -> PathBuf {
        self.workspace
            .scratch_root
            .clone()
            .unwrap_or_else(|| self.toolchain.root.clone())
    }

    pub fn workspace_prefix(&self) -> &str {
        self.workspace.prefix.as_deref().unwrap_or("tmp-")
    }

    pub fn validate(&self) -> Result<()> {
        let tc = &self.toolchain;
        let named = [
            ("toolchain.source_file", tc.source_file.as_str()),
            ("toolchain.assembly_extension", tc.assembly_extension.as_str()),
            ("toolchain.binary_extension", tc.binary_extension.as_str()),
            ("toolchain.assembler", tc.assembler.as_str()),
            ("toolchain.shell", tc.shell.as_str()),
        ];
        for (field, value) in named {
            if value.trim().is_empty() {
                return Err(PipelineError::Config(format!("{field} must not be empty")));
            }
        }
        if tc.compiler.as_os_str().is_empty() {
            return Err(PipelineError::Config("toolchain.compiler must not be empty".to_string()));
        }
        if tc.assembly_extension == tc.binary_extension {
            return Err(PipelineError::Config(
                "assembly and binary extensions must differ".to_string(),
            ));
        }
        if self.host.resolve() == HostEnvironment::Delegated && tc.broker.trim().is_empty() {
            return Err(PipelineError::Config(
                "toolchain.broker is required for delegated hosts".to_string(),
            ));
        }
        if self.workspace_prefix().is_empty() || self.workspace_prefix().contains('/') {
            return Err(PipelineError::Config(
                "workspace.prefix must be a non-empty file name fragment".to_string(),
            ));
        }
        if self.limits.compile_timeout_ms == 0 || self.limits.run_timeout_ms == 0 {
            return Err(PipelineError::Config("timeouts must be greater than zero".to_string()));
        }
        if self.limits.stdout_limit_bytes == 0 || self.limits.stderr_limit_bytes == 0 {
            return Err(PipelineError::Config("output limits must be greater than zero".to_string()));
        }
        Ok(())
    }
}

fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| {
        PipelineError::Config(format!("Failed to resolve path {}: {}", path.display(), e))
    })
}
