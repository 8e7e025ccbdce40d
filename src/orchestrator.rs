//! Single-flight request pipeline.
//!
//! ```text
//!  submit ──▶ Routing ──▶ (ToolCall) ──▶ ContextBuild ──▶ Streaming ──▶ Commit ──▶ Idle
//!               │             │               │               │            │
//!               └─────────────┴───────────────┴───────────────┴────────────┴──▶ Error ──▶ Idle
//! ```
//!
//! [`Orchestrator::submit`] runs on the foreground: it validates the
//! submission, refuses it while another request is in flight, appends the
//! user turn, marks the session busy and spawns one blocking worker. The
//! worker gets snapshots only (question, recent history, the knowledge
//! [`Retriever`]) and reports progress as [`WorkerEvent`]s over an ordered
//! channel. The foreground applies each event with
//! [`Orchestrator::on_event`]; only there is the session mutated, the
//! envelope validated, the assistant turn committed and the busy marker
//! cleared.
//!
//! Tool failures do not abort a request: the failure reason is folded into
//! the prompt and the model answers anyway. Routing, backend and output
//! validation failures end the request with an error envelope and commit
//! nothing.

use std::sync::Arc;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use uuid::Uuid;

use crate::backend::{
    ChatBackend, ChatMessage, ChatRequest, MessageContent, MessageRole, OpenAiCompatBackend,
};
use crate::config::{Config, Diversity};
use crate::error::AssistantError;
use crate::knowledge::{format_context, Retriever};
use crate::models::{ConversationTurn, OutputEnvelope, ToolResult, ToolUsed};
use crate::router::IntentRouter;
use crate::session::{Phase, Session};
use crate::tools::ToolRegistry;
use crate::validate::{validate_envelope, validate_submission, InputPolicy, Submission};

/// Progress reported by a request worker, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    Phase(Phase),
    Tool(ToolResult),
    Context(String),
    Delta(String),
    Finished(Completion),
    Failed(AssistantError),
}

/// Everything the worker produced for a successful request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub content: String,
    pub rag_context: String,
}

/// What the foreground should show after applying an event.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    Phase(Phase),
    Tool(ToolResult),
    Context(String),
    Delta(String),
    Done(OutputEnvelope),
    Failed {
        envelope: OutputEnvelope,
        error: AssistantError,
    },
}

impl Update {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Update::Done(_) | Update::Failed { .. })
    }
}

/// Handle to a running request.
pub struct InFlight {
    pub request_id: Uuid,
    events: UnboundedReceiver<WorkerEvent>,
}

impl InFlight {
    /// Next worker event, or `None` once the worker is gone.
    pub async fn next_event(&mut self) -> Option<WorkerEvent> {
        self.events.recv().await
    }
}

/// Retrieval settings applied to every request.
#[derive(Debug, Clone, Copy)]
pub struct RagSettings {
    pub enabled: bool,
    pub top_k: usize,
    pub diversity: Diversity,
}

pub struct Orchestrator {
    backend: Arc<dyn ChatBackend>,
    tools: Arc<ToolRegistry>,
    router: Arc<IntentRouter>,
    policy: InputPolicy,
    rag: RagSettings,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        tools: ToolRegistry,
        router: IntentRouter,
        policy: InputPolicy,
        rag: RagSettings,
    ) -> Self {
        Self {
            backend,
            tools: Arc::new(tools),
            router: Arc::new(router),
            policy,
            rag,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            Arc::new(OpenAiCompatBackend::from_config(&config.model)),
            ToolRegistry::from_config(config),
            IntentRouter::from_config(config),
            InputPolicy::from_config(&config.model),
            RagSettings {
                enabled: config.knowledge.rag_enabled,
                top_k: config.knowledge.top_k,
                diversity: config.knowledge.diversity,
            },
        )
    }

    pub fn policy(&self) -> &InputPolicy {
        &self.policy
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Starts a request. Must be called from within a Tokio runtime.
    ///
    /// Rejected submissions (invalid input, or a request already in flight)
    /// leave the session untouched and spawn nothing.
    pub fn submit(
        &self,
        session: &mut Session,
        submission: Submission,
    ) -> Result<InFlight, AssistantError> {
        validate_submission(&submission, &self.policy)?;
        if session.is_busy() {
            tracing::warn!("submission rejected: a request is already in flight");
            return Err(AssistantError::Busy);
        }

        let history = session.history.recent().to_vec();
        session
            .history
            .append(ConversationTurn::user(submission.question.clone()));

        let request_id = Uuid::new_v4();
        session.begin(request_id, submission.model.clone());
        tracing::info!(request_id = %request_id, model = %submission.model, "request started");

        let job = RequestJob {
            question: submission.question,
            model: submission.model,
            temperature: submission.temperature,
            image: submission.image,
            history,
            retriever: session.knowledge.retriever(),
            rag: self.rag,
            backend: Arc::clone(&self.backend),
            tools: Arc::clone(&self.tools),
            router: Arc::clone(&self.router),
        };
        let (tx, rx) = unbounded_channel();
        tokio::task::spawn_blocking(move || job.run(tx));

        Ok(InFlight {
            request_id,
            events: rx,
        })
    }

    /// Applies one worker event to the session.
    pub fn on_event(&self, session: &mut Session, event: WorkerEvent) -> Update {
        match event {
            WorkerEvent::Phase(phase) => {
                session.set_phase(phase);
                Update::Phase(phase)
            }
            WorkerEvent::Tool(result) => {
                session.note_tool(result.kind.into());
                Update::Tool(result)
            }
            WorkerEvent::Context(context) => Update::Context(context),
            WorkerEvent::Delta(text) => Update::Delta(text),
            WorkerEvent::Finished(completion) => self.commit(session, completion),
            WorkerEvent::Failed(error) => self.fail(session, error),
        }
    }

    /// Applies events until the request ends and returns its envelope.
    pub async fn drive<F>(
        &self,
        session: &mut Session,
        mut in_flight: InFlight,
        mut on_update: F,
    ) -> OutputEnvelope
    where
        F: FnMut(&Update),
    {
        while let Some(event) = in_flight.next_event().await {
            let update = self.on_event(session, event);
            on_update(&update);
            match update {
                Update::Done(envelope) | Update::Failed { envelope, .. } => return envelope,
                _ => {}
            }
        }

        let update = self.on_event(
            session,
            WorkerEvent::Failed(AssistantError::Backend(
                "request worker exited unexpectedly".to_string(),
            )),
        );
        on_update(&update);
        match update {
            Update::Done(envelope) | Update::Failed { envelope, .. } => envelope,
            _ => OutputEnvelope::error("request ended without a result", "", ToolUsed::None),
        }
    }

    /// [`submit`](Self::submit) followed by [`drive`](Self::drive).
    pub async fn run<F>(
        &self,
        session: &mut Session,
        submission: Submission,
        on_update: F,
    ) -> Result<OutputEnvelope, AssistantError>
    where
        F: FnMut(&Update),
    {
        let in_flight = self.submit(session, submission)?;
        Ok(self.drive(session, in_flight, on_update).await)
    }

    fn commit(&self, session: &mut Session, completion: Completion) -> Update {
        session.set_phase(Phase::Commit);
        let (model, tool_used) = active_labels(session);
        let envelope =
            OutputEnvelope::success(completion.content, model, completion.rag_context, tool_used);

        if let Err(error) = validate_envelope(&envelope) {
            return self.fail(session, error);
        }

        session.history.append(ConversationTurn::assistant(&envelope));
        session.history.truncate_to_bound();
        tracing::info!(
            request_id = ?session.active_request_id(),
            tool = tool_used.as_str(),
            chars = envelope.content.chars().count(),
            "request committed"
        );
        session.finish();
        Update::Done(envelope)
    }

    fn fail(&self, session: &mut Session, error: AssistantError) -> Update {
        session.set_phase(Phase::Error);
        let (model, tool_used) = active_labels(session);
        let envelope = OutputEnvelope::error(error.to_string(), model, tool_used);
        if let Err(e) = validate_envelope(&envelope) {
            tracing::warn!(error = %e, "error envelope failed validation");
        }
        tracing::warn!(
            request_id = ?session.active_request_id(),
            kind = error.kind(),
            error = %error,
            "request failed"
        );
        session.history.truncate_to_bound();
        session.finish();
        Update::Failed { envelope, error }
    }
}

fn active_labels(session: &Session) -> (String, ToolUsed) {
    session
        .active()
        .map(|a| (a.model.clone(), a.tool_used))
        .unwrap_or_default()
}

// ═══════════════════════════════════════════════════════════════════════
// Prompt assembly
// ═══════════════════════════════════════════════════════════════════════

/// User prompt after a tool ran. A failed tool still yields a prompt.
pub fn tool_prompt(result: &ToolResult, question: &str) -> String {
    if result.success {
        format!(
            "Based on the {} result:\n{}\n\nAnswer the user's question: {}",
            result.kind.label(),
            result.result_text,
            question
        )
    } else {
        format!(
            "tool {} failed: {}; answer directly: {}",
            result.kind, result.result_text, question
        )
    }
}

pub fn rag_system_prompt(context: &str) -> String {
    format!(
        "Answer using the following context:\n{}\n\nIf the context contains nothing relevant, answer from your own knowledge.",
        context
    )
}

/// Messages for one completion: optional grounding context, recent history,
/// then the new prompt.
pub fn build_messages(
    rag_context: &str,
    history: &[ConversationTurn],
    prompt: &str,
    image: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    if !rag_context.is_empty() {
        messages.push(ChatMessage::system(rag_system_prompt(rag_context)));
    }
    messages.extend(history.iter().map(|turn| ChatMessage {
        role: MessageRole::from(turn.role),
        content: MessageContent::Text(turn.content.clone()),
    }));
    let content = match image {
        Some(image) => MessageContent::Multimodal {
            text: prompt.to_string(),
            image_base64: image.to_string(),
        },
        None => MessageContent::Text(prompt.to_string()),
    };
    messages.push(ChatMessage {
        role: MessageRole::User,
        content,
    });
    messages
}

// ═══════════════════════════════════════════════════════════════════════
// Worker
// ═══════════════════════════════════════════════════════════════════════

struct RequestJob {
    question: String,
    model: String,
    temperature: f64,
    image: Option<String>,
    history: Vec<ConversationTurn>,
    retriever: Option<Arc<Retriever>>,
    rag: RagSettings,
    backend: Arc<dyn ChatBackend>,
    tools: Arc<ToolRegistry>,
    router: Arc<IntentRouter>,
}

impl RequestJob {
    fn run(self, tx: UnboundedSender<WorkerEvent>) {
        let outcome = self.execute(&tx);
        let last = match outcome {
            Ok(completion) => WorkerEvent::Finished(completion),
            Err(error) => WorkerEvent::Failed(error),
        };
        // The receiver only disappears if the foreground gave up on us.
        let _ = tx.send(last);
    }

    fn execute(&self, tx: &UnboundedSender<WorkerEvent>) -> Result<Completion, AssistantError> {
        let emit = |event: WorkerEvent| {
            let _ = tx.send(event);
        };

        emit(WorkerEvent::Phase(Phase::Routing));
        let prompt = match self.router.classify(&self.question)? {
            Some(request) => {
                emit(WorkerEvent::Phase(Phase::ToolCall));
                let result = self.tools.invoke(&request);
                emit(WorkerEvent::Tool(result.clone()));
                tool_prompt(&result, &self.question)
            }
            None => self.question.clone(),
        };

        emit(WorkerEvent::Phase(Phase::ContextBuild));
        let rag_context = match (&self.retriever, self.rag.enabled) {
            (Some(retriever), true) => format_context(&retriever.retrieve(
                &self.question,
                self.rag.top_k,
                self.rag.diversity,
            )),
            _ => String::new(),
        };
        if !rag_context.is_empty() {
            emit(WorkerEvent::Context(rag_context.clone()));
        }

        let request = ChatRequest {
            model: self.model.clone(),
            messages: build_messages(
                &rag_context,
                &self.history,
                &prompt,
                self.image.as_deref(),
            ),
            temperature: self.temperature,
        };

        emit(WorkerEvent::Phase(Phase::Streaming));
        let mut content = String::new();
        for delta in self.backend.stream_chat(&request)? {
            let delta = delta?;
            content.push_str(&delta);
            emit(WorkerEvent::Delta(delta));
        }

        Ok(Completion {
            content,
            rag_context,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ToolKind;

    #[test]
    fn test_tool_prompt_success_and_failure() {
        let ok = ToolResult::ok(ToolKind::Weather, "晴 25°C");
        let prompt = tool_prompt(&ok, "杭州市天气怎么样");
        assert!(prompt.contains("晴 25°C"));
        assert!(prompt.ends_with("杭州市天气怎么样"));

        let failed = ToolResult::failed(ToolKind::Weather, "weather API key is not configured");
        assert_eq!(
            tool_prompt(&failed, "杭州市天气怎么样"),
            "tool weather failed: weather API key is not configured; answer directly: 杭州市天气怎么样"
        );
    }

    #[test]
    fn test_build_messages_without_context() {
        let history = vec![ConversationTurn::user("上一个问题")];
        let messages = build_messages("", &history, "新问题", None);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, MessageRole::User);
        assert_eq!(messages[1].content.text(), "新问题");
    }

    #[test]
    fn test_build_messages_prepends_context_and_image() {
        let messages = build_messages("source: a.txt\ncontent: x", &[], "这是什么", Some("QUJD"));
        assert_eq!(messages[0].role, MessageRole::System);
        assert!(messages[0].content.text().contains("source: a.txt"));
        assert!(matches!(
            messages[1].content,
            MessageContent::Multimodal { .. }
        ));
    }
}
