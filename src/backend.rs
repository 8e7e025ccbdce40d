//! Streaming chat-completion backend.
//!
//! [`ChatBackend`] is the seam between the orchestrator and a model service:
//! one call per request, returning a lazy, forward-only stream of text
//! deltas. [`OpenAiCompatBackend`] speaks the OpenAI `/chat/completions`
//! protocol with `stream: true` and reads server-sent events line by line.
//!
//! The stream is blocking and is consumed on the request worker thread.

use serde::Serialize;
use serde_json::{json, Value};
use std::io::BufRead;
use std::time::Duration;

use crate::config::ModelConfig;
use crate::error::AssistantError;
use crate::models::Role;

/// Role of a message on the wire. Only the backend knows about `system`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl From<Role> for MessageRole {
    fn from(role: Role) -> Self {
        match role {
            Role::User => MessageRole::User,
            Role::Assistant => MessageRole::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessageContent {
    Text(String),
    /// Text plus a base64-encoded JPEG, for the vision model.
    Multimodal { text: String, image_base64: String },
}

impl MessageContent {
    pub fn text(&self) -> &str {
        match self {
            MessageContent::Text(t) => t,
            MessageContent::Multimodal { text, .. } => text,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// OpenAI wire form. Multimodal content becomes a parts array.
    pub fn to_wire(&self) -> Value {
        let content = match &self.content {
            MessageContent::Text(text) => json!(text),
            MessageContent::Multimodal { text, image_base64 } => json!([
                { "type": "text", "text": text },
                {
                    "type": "image_url",
                    "image_url": { "url": format!("data:image/jpeg;base64,{}", image_base64) }
                }
            ]),
        };
        json!({ "role": self.role, "content": content })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f64,
}

impl ChatRequest {
    pub fn to_wire(&self) -> Value {
        json!({
            "model": self.model,
            "messages": self.messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
            "temperature": self.temperature,
            "stream": true,
        })
    }
}

/// Text deltas in arrival order. An `Err` item ends the stream.
pub type TextStream = Box<dyn Iterator<Item = Result<String, AssistantError>> + Send>;

// ═══════════════════════════════════════════════════════════════════════
// Backend Trait
// ═══════════════════════════════════════════════════════════════════════

pub trait ChatBackend: Send + Sync {
    /// Starts one streaming completion. Blocking.
    fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, AssistantError>;
}

// ═══════════════════════════════════════════════════════════════════════
// OpenAI-compatible HTTP backend
// ═══════════════════════════════════════════════════════════════════════

pub struct OpenAiCompatBackend {
    base_url: String,
    api_key: String,
    timeout: Option<Duration>,
}

impl OpenAiCompatBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            timeout: None,
        }
    }

    pub fn from_config(config: &ModelConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            api_key: config.api_key.clone(),
            timeout: config.timeout_secs.map(Duration::from_secs),
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

impl ChatBackend for OpenAiCompatBackend {
    fn stream_chat(&self, request: &ChatRequest) -> Result<TextStream, AssistantError> {
        if self.api_key.trim().is_empty() {
            return Err(AssistantError::Backend(
                "model API key is not configured (set [model] api_key)".to_string(),
            ));
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| AssistantError::Backend(e.to_string()))?;

        let response = client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&request.to_wire())
            .send()
            .map_err(|e| AssistantError::Backend(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(AssistantError::Backend(format!(
                "HTTP {}: {}",
                status.as_u16(),
                body.trim()
            )));
        }

        tracing::debug!(model = %request.model, "completion stream opened");
        Ok(Box::new(SseStream::new(std::io::BufReader::new(response))))
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Server-sent events
// ═══════════════════════════════════════════════════════════════════════

/// One parsed SSE line.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Delta(String),
    Done,
    Error(String),
    Skip,
}

pub fn parse_sse_line(line: &str) -> SseEvent {
    let Some(data) = line.strip_prefix("data:") else {
        return SseEvent::Skip;
    };
    let data = data.trim();
    if data.is_empty() {
        return SseEvent::Skip;
    }
    if data == "[DONE]" {
        return SseEvent::Done;
    }

    let value: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(e) => return SseEvent::Error(format!("malformed stream chunk: {}", e)),
    };
    if let Some(error) = value.get("error") {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return SseEvent::Error(message);
    }

    match value
        .pointer("/choices/0/delta/content")
        .and_then(Value::as_str)
    {
        Some(text) => SseEvent::Delta(text.to_string()),
        None => SseEvent::Skip,
    }
}

/// Iterator over the content deltas of an SSE body.
pub struct SseStream<R> {
    reader: R,
    finished: bool,
}

impl<R: BufRead> SseStream<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            finished: false,
        }
    }
}

impl<R: BufRead> Iterator for SseStream<R> {
    type Item = Result<String, AssistantError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let mut line = String::new();
        loop {
            line.clear();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    self.finished = true;
                    return None;
                }
                Ok(_) => {}
                Err(e) => {
                    self.finished = true;
                    return Some(Err(AssistantError::Backend(format!(
                        "stream interrupted: {}",
                        e
                    ))));
                }
            }

            match parse_sse_line(line.trim_end()) {
                SseEvent::Delta(text) if !text.is_empty() => return Some(Ok(text)),
                SseEvent::Delta(_) | SseEvent::Skip => continue,
                SseEvent::Done => {
                    self.finished = true;
                    return None;
                }
                SseEvent::Error(message) => {
                    self.finished = true;
                    return Some(Err(AssistantError::Backend(message)));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_parse_sse_line() {
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"content":"你好"}}]}"#),
            SseEvent::Delta("你好".to_string())
        );
        assert_eq!(parse_sse_line("data: [DONE]"), SseEvent::Done);
        assert_eq!(parse_sse_line(": keep-alive"), SseEvent::Skip);
        assert_eq!(parse_sse_line("event: message"), SseEvent::Skip);
        assert_eq!(
            parse_sse_line(r#"data: {"choices":[{"delta":{"role":"assistant"}}]}"#),
            SseEvent::Skip
        );
        assert_eq!(
            parse_sse_line(r#"data: {"error":{"message":"rate limited"}}"#),
            SseEvent::Error("rate limited".to_string())
        );
        assert!(matches!(parse_sse_line("data: {oops"), SseEvent::Error(_)));
    }

    #[test]
    fn test_stream_yields_deltas_in_order_until_done() {
        let body = concat!(
            "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        );
        let deltas: Vec<String> = SseStream::new(Cursor::new(body))
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(deltas, vec!["Hel", "lo"]);
    }

    #[test]
    fn test_stream_error_terminates() {
        let body = "data: {\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\ndata: {\"error\":\"boom\"}\ndata: {\"choices\":[{\"delta\":{\"content\":\"b\"}}]}\n";
        let items: Vec<_> = SseStream::new(Cursor::new(body)).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok("a".to_string()));
        assert!(matches!(items[1], Err(AssistantError::Backend(_))));
    }

    #[test]
    fn test_multimodal_wire_format() {
        let msg = ChatMessage {
            role: MessageRole::User,
            content: MessageContent::Multimodal {
                text: "what is this".into(),
                image_base64: "QUJD".into(),
            },
        };
        let wire = msg.to_wire();
        assert_eq!(wire["role"], "user");
        assert_eq!(wire["content"][0]["type"], "text");
        assert_eq!(
            wire["content"][1]["image_url"]["url"],
            "data:image/jpeg;base64,QUJD"
        );
    }

    #[test]
    fn test_request_is_streaming() {
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage::system("ctx"), ChatMessage::user("hi")],
            temperature: 0.5,
        };
        let wire = req.to_wire();
        assert_eq!(wire["stream"], true);
        assert_eq!(wire["messages"][0]["role"], "system");
        assert_eq!(wire["messages"][1]["content"], "hi");
    }

    #[test]
    fn test_missing_api_key_fails_before_io() {
        let backend = OpenAiCompatBackend::new("http://127.0.0.1:9", "");
        let req = ChatRequest {
            model: "m".into(),
            messages: vec![ChatMessage::user("hi")],
            temperature: 0.7,
        };
        assert!(matches!(
            backend.stream_chat(&req),
            Err(AssistantError::Backend(_))
        ));
    }
}
