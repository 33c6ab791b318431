//! Pipeline orchestrator.
//!
//! Sequences the compile stage and the assemble-and-run stage for one request
//! inside its own workspace:
//!
//! ```text
//! Idle -> Compiling -> CompileFailed                        (terminal)
//!                   -> Compiled -> Running -> RunFailed    -> ResultReady
//!                                          -> RunSucceeded -> ResultReady
//! ```
//!
//! Compile failures are the caller's business and come back as the result's
//! error. Run-stage failures only mean there is nothing to show, so they are
//! logged and folded into empty program output. The workspace is released on
//! every path before `execute` returns; the guard's `Drop` covers panics and
//! cancellation.

use crate::config::settings::PipelineConfig;
use crate::config::types::{PipelineError, Result};
use crate::exec::invoker::ProcessInvoker;
use crate::exec::strategy::strategy_for;
use crate::observability::events::{self, PipelineEvent, Stage};
use crate::pipeline::compile::{self, CompileOutput};
use crate::pipeline::request::CompileRequest;
use crate::pipeline::run;
use crate::safety::workspace::{Workspace, WorkspaceManager};
use crate::toolchain::{ToolchainAdapter, X86Toolchain};
use crate::utils::output::OutputLimits;
use log::{debug, info, warn};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Idle,
    Compiling,
    CompileFailed,
    Compiled,
    Running,
    RunFailed,
    RunSucceeded,
    ResultReady,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, Compiling)
                | (Compiling, CompileFailed)
                | (Compiling, Compiled)
                | (Compiled, Running)
                | (Compiled, ResultReady)
                | (Running, RunFailed)
                | (Running, RunSucceeded)
                | (RunFailed, ResultReady)
                | (RunSucceeded, ResultReady)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, PipelineState::CompileFailed | PipelineState::ResultReady)
    }
}

/// Outcome of the assemble-and-run stage as seen by the orchestrator
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum RunStatus {
    /// Compile failed, or no assembly was produced
    #[default]
    NotAttempted,
    Succeeded,
    /// Failure reason, already logged and swallowed
    Failed(String),
}

/// The single response object of one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PipelineResult {
    /// Assembly text, verbatim; empty when none was produced
    pub assembly: String,
    /// Program stdout with trailing whitespace removed
    pub program_output: String,
    /// Compiler diagnostic, verbatim, when the compile stage failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    pub run_status: RunStatus,
    /// States visited, `Idle` first
    #[serde(skip)]
    pub transitions: Vec<PipelineState>,
}

impl PipelineResult {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    pub fn final_state(&self) -> PipelineState {
        self.transitions
            .last()
            .copied()
            .unwrap_or(PipelineState::Idle)
    }
}

struct StateTracker<'a> {
    run_id: &'a str,
    visited: Vec<PipelineState>,
}

impl<'a> StateTracker<'a> {
    fn new(run_id: &'a str) -> Self {
        Self {
            run_id,
            visited: vec![PipelineState::Idle],
        }
    }

    fn current(&self) -> PipelineState {
        self.visited
            .last()
            .copied()
            .unwrap_or(PipelineState::Idle)
    }

    fn advance(&mut self, next: PipelineState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {current:?} -> {next:?}"
        );
        debug!("[{}] {:?} -> {:?}", self.run_id, current, next);
        self.visited.push(next);
    }
}

/// Compile-and-execute pipeline. Cheap to share: one instance serves any
/// number of concurrent requests.
#[derive(Debug)]
pub struct Pipeline {
    config: PipelineConfig,
    workspaces: WorkspaceManager,
    invoker: ProcessInvoker,
    toolchain: Arc<dyn ToolchainAdapter>,
}

impl Pipeline {
    /// Build a pipeline for the configured x86 toolchain.
    pub fn new(mut config: PipelineConfig) -> Result<Self> {
        config.resolve_paths()?;
        let toolchain = Arc::new(X86Toolchain::new(config.toolchain.clone()));
        Self::with_toolchain(config, toolchain)
    }

    pub fn with_toolchain(
        mut config: PipelineConfig,
        toolchain: Arc<dyn ToolchainAdapter>,
    ) -> Result<Self> {
        config.validate()?;
        config.resolve_paths()?;

        let host = config.host.resolve();
        let strategy = strategy_for(host, &config.toolchain);
        let limits = OutputLimits {
            stdout_limit: config.limits.stdout_limit_bytes,
            stderr_limit: config.limits.stderr_limit_bytes,
        };
        let invoker = ProcessInvoker::new(strategy, limits, config.limits.drain_timeout());
        let workspaces =
            WorkspaceManager::new(config.scratch_root(), config.workspace_prefix())?;

        info!(
            "Pipeline ready: toolchain={} host={} strategy={} scratch_root={}",
            toolchain.name(),
            host,
            invoker.strategy_name(),
            workspaces.scratch_root().display()
        );

        Ok(Self {
            config,
            workspaces,
            invoker,
            toolchain,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn workspaces(&self) -> &WorkspaceManager {
        &self.workspaces
    }

    pub fn toolchain(&self) -> &dyn ToolchainAdapter {
        self.toolchain.as_ref()
    }

    pub fn strategy_name(&self) -> &'static str {
        self.invoker.strategy_name()
    }

    /// The invoker every stage launches through, for toolchain probes
    pub fn invoker(&self) -> &ProcessInvoker {
        &self.invoker
    }

    /// Validate raw source text and run it.
    pub async fn execute_source(&self, source: &str) -> Result<PipelineResult> {
        let request = CompileRequest::new(source)?;
        self.execute(&request).await
    }

    /// Run one request end to end.
    ///
    /// `Err` means no workspace could be provisioned and nothing ran. Every
    /// other outcome, compile failure included, is an `Ok` result.
    pub async fn execute(&self, request: &CompileRequest) -> Result<PipelineResult> {
        let mut workspace = self.workspaces.create().await?;
        let run_id = workspace.run_id().to_string();
        events::emit(
            &run_id,
            PipelineEvent::WorkspaceCreated {
                path: workspace.path().display().to_string(),
            },
        );

        let result = self.drive(&workspace, request).await;

        let removed = workspace.release().await;
        events::emit(&run_id, PipelineEvent::CleanupFinished { removed });

        Ok(result)
    }

    async fn drive(&self, workspace: &Workspace, request: &CompileRequest) -> PipelineResult {
        let run_id = workspace.run_id();
        let mut state = StateTracker::new(run_id);

        state.advance(PipelineState::Compiling);
        events::emit(
            run_id,
            PipelineEvent::StageStarted {
                stage: Stage::Compile,
                strategy: self.invoker.strategy_name(),
            },
        );

        let compiled = match compile::compile(
            &self.invoker,
            self.toolchain.as_ref(),
            workspace,
            request.source(),
            self.config.limits.compile_timeout(),
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                let reason = compile_failure_text(e);
                events::emit(
                    run_id,
                    PipelineEvent::CompileFailed {
                        reason: reason.clone(),
                    },
                );
                state.advance(PipelineState::CompileFailed);
                return PipelineResult {
                    assembly: String::new(),
                    program_output: String::new(),
                    error: Some(reason),
                    run_status: RunStatus::NotAttempted,
                    transitions: state.visited,
                };
            }
        };
        state.advance(PipelineState::Compiled);
        events::emit(
            run_id,
            PipelineEvent::StageFinished {
                stage: Stage::Compile,
                wall_time_ms: compiled.wall_time.as_millis() as u64,
            },
        );

        let CompileOutput {
            assembly,
            assembly_file,
            ..
        } = compiled;

        let Some(assembly_file) = assembly_file else {
            let expected = self
                .toolchain
                .assembly_path(&workspace.artifact(self.toolchain.source_file_name()));
            events::emit(
                run_id,
                PipelineEvent::AssemblyMissing {
                    expected: expected.display().to_string(),
                },
            );
            state.advance(PipelineState::ResultReady);
            return PipelineResult {
                assembly,
                program_output: String::new(),
                error: None,
                run_status: RunStatus::NotAttempted,
                transitions: state.visited,
            };
        };

        state.advance(PipelineState::Running);
        events::emit(
            run_id,
            PipelineEvent::StageStarted {
                stage: Stage::AssembleAndRun,
                strategy: self.invoker.strategy_name(),
            },
        );

        let (program_output, run_status) = match run::assemble_and_run(
            &self.invoker,
            self.toolchain.as_ref(),
            &assembly_file,
            self.config.limits.run_timeout(),
        )
        .await
        {
            Ok(output) => {
                state.advance(PipelineState::RunSucceeded);
                events::emit(
                    run_id,
                    PipelineEvent::StageFinished {
                        stage: Stage::AssembleAndRun,
                        wall_time_ms: output.wall_time.as_millis() as u64,
                    },
                );
                (output.stdout.trim_end().to_string(), RunStatus::Succeeded)
            }
            Err(e) => {
                let reason = e.to_string();
                warn!("[{}] assemble-and-run failed: {}", run_id, reason.trim_end());
                events::emit(
                    run_id,
                    PipelineEvent::RunFailureSwallowed {
                        reason: reason.clone(),
                    },
                );
                state.advance(PipelineState::RunFailed);
                (String::new(), RunStatus::Failed(reason))
            }
        };

        state.advance(PipelineState::ResultReady);
        PipelineResult {
            assembly,
            program_output,
            error: None,
            run_status,
            transitions: state.visited,
        }
    }
}

/// Text surfaced for a compile-stage failure. Compiler diagnostics pass
/// through untouched.
fn compile_failure_text(err: PipelineError) -> String {
    match err {
        PipelineError::ToolFailure { message, .. } => message,
        other => other.to_string(),
    }
}
