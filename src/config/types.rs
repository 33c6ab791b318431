/// Core types and error taxonomy for the compilebox pipeline
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;

/// Where the external toolchain executes relative to this process
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum HostEnvironment {
    /// Resolve from the host platform
    #[default]
    Auto,
    /// Toolchain shares our process and path namespace
    Native,
    /// Toolchain only runs behind a shell/environment broker with its own
    /// path namespace (e.g. a Linux guest under a Windows host)
    Delegated,
}

static DETECTED_HOST: OnceLock<HostEnvironment> = OnceLock::new();

impl HostEnvironment {
    /// Host capability resolved once per process lifetime.
    pub fn detect() -> HostEnvironment {
        *DETECTED_HOST.get_or_init(|| {
            if cfg!(windows) {
                HostEnvironment::Delegated
            } else {
                HostEnvironment::Native
            }
        })
    }

    /// Collapse `Auto` into a concrete environment.
    pub fn resolve(self) -> HostEnvironment {
        match self {
            HostEnvironment::Auto => Self::detect(),
            other => other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HostEnvironment::Auto => "auto",
            HostEnvironment::Native => "native",
            HostEnvironment::Delegated => "delegated",
        }
    }
}

impl std::str::FromStr for HostEnvironment {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(HostEnvironment::Auto),
            "native" | "direct" => Ok(HostEnvironment::Native),
            "delegated" | "broker" | "wsl" => Ok(HostEnvironment::Delegated),
            other => Err(PipelineError::Config(format!(
                "unknown host environment: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for HostEnvironment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output integrity classification for a captured stream
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum OutputIntegrity {
    #[default]
    #[serde(rename = "complete")]
    Complete,
    #[serde(rename = "truncated_by_limit")]
    TruncatedByLimit,
    #[serde(rename = "read_error")]
    ReadError,
    #[serde(rename = "drain_timeout")]
    DrainTimeout,
}

impl std::fmt::Display for OutputIntegrity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputIntegrity::Complete => write!(f, "complete"),
            OutputIntegrity::TruncatedByLimit => write!(f, "truncated_by_limit"),
            OutputIntegrity::ReadError => write!(f, "read_error"),
            OutputIntegrity::DrainTimeout => write!(f, "drain_timeout"),
        }
    }
}

/// Result type for compilebox operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Error types for the compile-and-execute pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Rejected before any resource is allocated
    #[error("{0}")]
    Validation(String),

    /// External tool ran and exited unsuccessfully. Display is the captured
    /// diagnostic text, untouched.
    #[error("{message}")]
    ToolFailure {
        program: String,
        exit_code: Option<i32>,
        message: String,
    },

    /// External tool could not be started at all
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// External tool exceeded its wall-clock limit and was killed
    #[error("{program} exceeded wall-clock limit of {}ms and was terminated", limit.as_millis())]
    Timeout { program: String, limit: Duration },

    #[error("Workspace error: {0}")]
    Workspace(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub fn is_validation(&self) -> bool {
        matches!(self, PipelineError::Validation(_))
    }

    /// True for failures that originate in an external tool (exit status,
    /// launch, or timeout) rather than in our own plumbing.
    pub fn is_toolchain_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::ToolFailure { .. }
                | PipelineError::Launch { .. }
                | PipelineError::Timeout { .. }
        )
    }

    pub(crate) fn workspace_io(action: &str, path: &std::path::Path, e: std::io::Error) -> Self {
        PipelineError::Workspace(format!("{action} {}: {e}", path.display()))
    }
}

/// A path that is either handed to the toolchain as a filesystem location
/// (and therefore subject to namespace translation) or a literal token.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Operand {
    Path(PathBuf),
    Literal(String),
}

impl Operand {
    pub fn path(p: impl Into<PathBuf>) -> Self {
        Operand::Path(p.into())
    }

    pub fn literal(s: impl Into<String>) -> Self {
        Operand::Literal(s.into())
    }

    /// Host-native rendering.
    pub fn to_native(&self) -> String {
        match self {
            Operand::Path(p) => p.to_string_lossy().into_owned(),
            Operand::Literal(s) => s.clone(),
        }
    }
}
