//! JSON request/response shapes for HTTP-style front ends.
//!
//! Responses carry every field under both naming conventions existing
//! consumers read (`assembly`/`x86`, `stdout`/`execution_output`,
//! `execution_steps`/`steps`, `stack_state`/`stackState`). Failures are a bare
//! `{"error": ...}` object.

use crate::config::types::{PipelineError, Result};
use crate::pipeline::orchestrator::PipelineResult;
use crate::pipeline::request::CompileRequest;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const PROGRAM_OUTPUT_INSTRUCTION: &str = "program output";

/// Inbound request body. `kotlin_code` wins over `code` when both are set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompileRequestBody {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kotlin_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl CompileRequestBody {
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| PipelineError::Validation(format!("malformed request body: {e}")))
    }

    /// First non-empty source field, or "" when neither is set
    pub fn source(&self) -> &str {
        [self.kotlin_code.as_deref(), self.code.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.is_empty())
            .unwrap_or("")
    }

    pub fn into_request(self) -> Result<CompileRequest> {
        CompileRequest::new(self.source())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExecutionStep {
    pub instruction: String,
    #[serde(default)]
    pub registers: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
}

/// Successful response body
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CompileResponse {
    pub assembly: String,
    pub x86: String,
    pub stdout: String,
    pub execution_output: String,
    pub stack_state: Vec<serde_json::Value>,
    pub execution_steps: Vec<ExecutionStep>,
    pub steps: Vec<ExecutionStep>,
    #[serde(rename = "stackState")]
    pub stack_state_camel: Vec<serde_json::Value>,
}

impl CompileResponse {
    pub fn from_result(result: &PipelineResult) -> Self {
        let steps = if result.program_output.is_empty() {
            Vec::new()
        } else {
            vec![ExecutionStep {
                instruction: PROGRAM_OUTPUT_INSTRUCTION.to_string(),
                registers: BTreeMap::new(),
                output: Some(result.program_output.clone()),
            }]
        };

        Self {
            assembly: result.assembly.clone(),
            x86: result.assembly.clone(),
            stdout: result.program_output.clone(),
            execution_output: result.program_output.clone(),
            stack_state: Vec::new(),
            execution_steps: steps.clone(),
            steps,
            stack_state_camel: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum WireResponse {
    Success(CompileResponse),
    Failure(ErrorBody),
}

impl WireResponse {
    pub fn to_json(&self, pretty: bool) -> String {
        let rendered = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Ok,
    ClientError,
    ServerError,
}

impl ResponseStatus {
    pub fn code(self) -> u16 {
        match self {
            ResponseStatus::Ok => 200,
            ResponseStatus::ClientError => 400,
            ResponseStatus::ServerError => 500,
        }
    }
}

/// Map a pipeline outcome onto a status and response body.
pub fn respond(outcome: &Result<PipelineResult>) -> (ResponseStatus, WireResponse) {
    match outcome {
        Ok(result) => match &result.error {
            None => (
                ResponseStatus::Ok,
                WireResponse::Success(CompileResponse::from_result(result)),
            ),
            Some(diagnostic) => (
                ResponseStatus::ServerError,
                WireResponse::Failure(ErrorBody {
                    error: diagnostic.clone(),
                }),
            ),
        },
        Err(e) if e.is_validation() => (
            ResponseStatus::ClientError,
            WireResponse::Failure(ErrorBody {
                error: e.to_string(),
            }),
        ),
        Err(e) => (
            ResponseStatus::ServerError,
            WireResponse::Failure(ErrorBody {
                error: e.to_string(),
            }),
        ),
    }
}
