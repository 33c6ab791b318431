use crate::config::types::{PipelineError, Result};

pub const EMPTY_SOURCE_MESSAGE: &str = "source code is empty";

/// Validated source submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileRequest {
    source: String,
}

impl CompileRequest {
    /// Reject sources that are empty after trimming. Nothing is allocated or
    /// spawned for a rejected request.
    pub fn new(source: impl Into<String>) -> Result<Self> {
        let source = source.into();
        if source.trim().is_empty() {
            return Err(PipelineError::Validation(EMPTY_SOURCE_MESSAGE.to_string()));
        }
        Ok(Self { source })
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}
