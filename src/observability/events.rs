/// Structured pipeline event log
///
/// Each lifecycle event is serialised to a single JSON line and logged on the
/// `compilebox::audit` target, correlated by the workspace run id.
use log::{info, warn};
use serde::Serialize;
use std::time::SystemTime;

pub const AUDIT_TARGET: &str = "compilebox::audit";

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PipelineEvent {
    WorkspaceCreated {
        path: String,
    },
    StageStarted {
        stage: Stage,
        strategy: &'static str,
    },
    StageFinished {
        stage: Stage,
        wall_time_ms: u64,
    },
    CompileFailed {
        reason: String,
    },
    /// Run-stage failure recovered into empty output
    RunFailureSwallowed {
        reason: String,
    },
    AssemblyMissing {
        expected: String,
    },
    CleanupFinished {
        removed: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Compile,
    AssembleAndRun,
}

impl PipelineEvent {
    fn is_degraded(&self) -> bool {
        matches!(
            self,
            PipelineEvent::RunFailureSwallowed { .. }
                | PipelineEvent::CleanupFinished { removed: false }
        )
    }
}

#[derive(Serialize)]
struct Envelope<'a> {
    run_id: &'a str,
    timestamp: u64,
    #[serde(flatten)]
    event: &'a PipelineEvent,
}

/// Render an event as a JSON line.
pub fn render(run_id: &str, event: &PipelineEvent) -> String {
    let timestamp = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let envelope = Envelope {
        run_id,
        timestamp,
        event,
    };
    serde_json::to_string(&envelope).unwrap_or_else(|e| format!("{{\"render_error\":\"{e}\"}}"))
}

pub fn emit(run_id: &str, event: PipelineEvent) {
    let line = render(run_id, &event);
    if event.is_degraded() {
        warn!(target: AUDIT_TARGET, "{}", line);
    } else {
        info!(target: AUDIT_TARGET, "{}", line);
    }
}
