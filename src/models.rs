//! Core data models shared by the router, tools, memory and orchestrator.
//!
//! These types represent the conversation turns, tool requests and results,
//! and response envelopes that flow through a single request.

use serde::{Deserialize, Serialize};

/// Seconds since the Unix epoch with microsecond precision.
pub fn now_timestamp() -> f64 {
    chrono::Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// Speaker of a conversation turn. `"ai"` is accepted on input and normalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    #[serde(alias = "ai")]
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One message in the conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rag_context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_used: Option<ToolUsed>,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            model: None,
            timestamp: None,
            rag_context: None,
            tool_used: None,
        }
    }

    /// Assistant turn built from a validated success envelope.
    pub fn assistant(envelope: &OutputEnvelope) -> Self {
        Self {
            role: Role::Assistant,
            content: envelope.content.clone(),
            model: Some(envelope.model.clone()),
            timestamp: Some(envelope.timestamp),
            rag_context: Some(envelope.rag_context.clone()),
            tool_used: Some(envelope.tool_used),
        }
    }
}

/// External capability the router can select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    Search,
    Weather,
    File,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Search => "search",
            ToolKind::Weather => "weather",
            ToolKind::File => "file",
        }
    }

    /// Human label used when folding a result into a prompt.
    pub fn label(&self) -> &'static str {
        match self {
            ToolKind::Search => "web search",
            ToolKind::Weather => "weather lookup",
            ToolKind::File => "file read",
        }
    }
}

impl std::fmt::Display for ToolKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ToolKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(ToolKind::Search),
            "weather" => Ok(ToolKind::Weather),
            "file" => Ok(ToolKind::File),
            other => Err(format!(
                "unknown tool '{}': expected search, weather, or file",
                other
            )),
        }
    }
}

/// Router decision: which tool to run and with what argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRequest {
    pub kind: ToolKind,
    pub argument: String,
}

/// Outcome of a tool invocation. Failures are data, not errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolResult {
    pub kind: ToolKind,
    pub result_text: String,
    pub success: bool,
}

impl ToolResult {
    pub fn ok(kind: ToolKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            result_text: text.into(),
            success: true,
        }
    }

    pub fn failed(kind: ToolKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            result_text: reason.into(),
            success: false,
        }
    }
}

/// Which tool, if any, contributed to a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolUsed {
    #[default]
    None,
    File,
    Weather,
    Search,
}

impl ToolUsed {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolUsed::None => "none",
            ToolUsed::File => "file",
            ToolUsed::Weather => "weather",
            ToolUsed::Search => "search",
        }
    }
}

impl From<ToolKind> for ToolUsed {
    fn from(kind: ToolKind) -> Self {
        match kind {
            ToolKind::Search => ToolUsed::Search,
            ToolKind::Weather => ToolUsed::Weather,
            ToolKind::File => ToolUsed::File,
        }
    }
}

/// Envelope status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Success,
    Error,
    Loading,
    ToolRequired,
}

/// Final response of one request, validated before it is committed or shown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputEnvelope {
    pub status: Status,
    pub content: String,
    pub timestamp: f64,
    pub model: String,
    #[serde(default)]
    pub rag_context: String,
    pub tool_used: ToolUsed,
}

impl OutputEnvelope {
    pub fn success(
        content: impl Into<String>,
        model: impl Into<String>,
        rag_context: impl Into<String>,
        tool_used: ToolUsed,
    ) -> Self {
        Self {
            status: Status::Success,
            content: content.into(),
            timestamp: now_timestamp(),
            model: model.into(),
            rag_context: rag_context.into(),
            tool_used,
        }
    }

    pub fn error(message: impl Into<String>, model: impl Into<String>, tool_used: ToolUsed) -> Self {
        Self {
            status: Status::Error,
            content: message.into(),
            timestamp: now_timestamp(),
            model: model.into(),
            rag_context: String::new(),
            tool_used,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }
}

/// A unit of retrievable text tagged with the basename of its document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeChunk {
    pub source: String,
    pub content: String,
}
