//! Error taxonomy for the request pipeline.
//!
//! Tool failures are deliberately absent: adapters report them as data in
//! [`ToolResult`](crate::models::ToolResult) and the orchestrator folds them
//! into a degraded prompt. Every other failure aborts the current request and
//! is normalized into an error [`OutputEnvelope`](crate::models::OutputEnvelope).

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssistantError {
    /// Malformed or out-of-range submission. Rejected before any state change.
    #[error("invalid input: {0}")]
    InputValidation(String),

    /// The router could not extract a usable tool argument.
    #[error("routing failed: {0}")]
    Routing(String),

    /// The model call or its stream failed.
    #[error("model backend error: {0}")]
    Backend(String),

    /// The response envelope did not satisfy the output schema.
    #[error("invalid output: {0}")]
    OutputValidation(String),

    /// Saving or loading conversation state failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// A request is already in flight.
    #[error("busy: wait for the current response to finish")]
    Busy,
}

impl AssistantError {
    /// Stable machine-readable name, used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            AssistantError::InputValidation(_) => "input_validation",
            AssistantError::Routing(_) => "routing",
            AssistantError::Backend(_) => "backend",
            AssistantError::OutputValidation(_) => "output_validation",
            AssistantError::Persistence(_) => "persistence",
            AssistantError::Busy => "busy",
        }
    }
}

impl From<serde_json::Error> for AssistantError {
    fn from(err: serde_json::Error) -> Self {
        AssistantError::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for AssistantError {
    fn from(err: std::io::Error) -> Self {
        AssistantError::Persistence(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_includes_detail() {
        let err = AssistantError::Routing("file path has no drive separator".to_string());
        assert_eq!(
            err.to_string(),
            "routing failed: file path has no drive separator"
        );
        assert_eq!(err.kind(), "routing");
    }

    #[test]
    fn test_io_errors_become_persistence() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AssistantError = io.into();
        assert_eq!(err.kind(), "persistence");
    }
}
