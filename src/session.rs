//! Foreground-owned conversation state.
//!
//! A [`Session`] bundles everything a request may change: the conversation
//! history, the knowledge base, the pipeline phase and the in-flight marker.
//! Only the foreground mutates it. Request workers receive snapshots and
//! report back through events.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::AssistantError;
use crate::knowledge::KnowledgeBase;
use crate::memory::ConversationHistory;
use crate::models::ToolUsed;
use crate::segment::Segmenter;
use crate::sessions;

/// Where the current request is in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Routing,
    ToolCall,
    ContextBuild,
    Streaming,
    Commit,
    Error,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Routing => "routing",
            Phase::ToolCall => "tool_call",
            Phase::ContextBuild => "context_build",
            Phase::Streaming => "streaming",
            Phase::Commit => "commit",
            Phase::Error => "error",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ActiveRequest {
    pub(crate) id: Uuid,
    pub(crate) model: String,
    pub(crate) tool_used: ToolUsed,
}

pub struct Session {
    pub history: ConversationHistory,
    pub knowledge: KnowledgeBase,
    phase: Phase,
    active: Option<ActiveRequest>,
}

impl Session {
    pub fn new(history: ConversationHistory, knowledge: KnowledgeBase) -> Self {
        Self {
            history,
            knowledge,
            phase: Phase::Idle,
            active: None,
        }
    }

    pub fn from_config(config: &Config, segmenter: Arc<dyn Segmenter>) -> Result<Self> {
        Ok(Self::new(
            ConversationHistory::new(config.memory.max_history_length),
            KnowledgeBase::from_config(&config.knowledge, segmenter)?,
        ))
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True while a request is in flight.
    pub fn is_busy(&self) -> bool {
        self.active.is_some()
    }

    pub fn active_request_id(&self) -> Option<Uuid> {
        self.active.as_ref().map(|a| a.id)
    }

    pub(crate) fn begin(&mut self, id: Uuid, model: String) {
        self.active = Some(ActiveRequest {
            id,
            model,
            tool_used: ToolUsed::None,
        });
        self.phase = Phase::Routing;
    }

    pub(crate) fn set_phase(&mut self, phase: Phase) {
        if self.phase != phase {
            tracing::debug!(from = %self.phase, to = %phase, "phase transition");
        }
        self.phase = phase;
    }

    pub(crate) fn note_tool(&mut self, tool: ToolUsed) {
        if let Some(active) = self.active.as_mut() {
            active.tool_used = tool;
        }
    }

    pub(crate) fn active(&self) -> Option<&ActiveRequest> {
        self.active.as_ref()
    }

    pub(crate) fn finish(&mut self) {
        self.active = None;
        self.set_phase(Phase::Idle);
    }

    /// Clears the conversation. Refused while a request is in flight.
    pub fn clear_history(&mut self) -> Result<(), AssistantError> {
        if self.is_busy() {
            return Err(AssistantError::Busy);
        }
        self.history.clear();
        Ok(())
    }

    pub fn save(&self, dir: &Path) -> Result<PathBuf, AssistantError> {
        sessions::save(&self.history, dir)
    }

    /// Replaces the history with a saved conversation. On any failure the
    /// current history is left as it was.
    pub fn load(&mut self, path: &Path) -> Result<usize, AssistantError> {
        if self.is_busy() {
            return Err(AssistantError::Busy);
        }
        let turns = sessions::load(path)?;
        self.history.replace(turns);
        Ok(self.history.len())
    }
}
