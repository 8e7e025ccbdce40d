//! Bounded conversation history.
//!
//! Holds at most `2 * max_history_length` turns (one user plus one assistant
//! turn per exchange). Appends never truncate on their own; the orchestrator
//! calls [`ConversationHistory::truncate_to_bound`] after every committed
//! assistant turn, dropping the oldest turns first.

use crate::error::AssistantError;
use crate::models::ConversationTurn;

#[derive(Debug, Clone)]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
    max_history_length: usize,
}

impl ConversationHistory {
    pub fn new(max_history_length: usize) -> Self {
        Self {
            turns: Vec::new(),
            max_history_length: max_history_length.max(1),
        }
    }

    /// Maximum number of turns kept.
    pub fn bound(&self) -> usize {
        2 * self.max_history_length
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// Drops the oldest turns beyond the bound. Returns how many were dropped.
    pub fn truncate_to_bound(&mut self) -> usize {
        let excess = self.turns.len().saturating_sub(self.bound());
        if excess > 0 {
            self.turns.drain(..excess);
            tracing::debug!(dropped = excess, kept = self.turns.len(), "history truncated");
        }
        excess
    }

    /// The most recent turns that fit in a prompt, oldest first.
    pub fn recent(&self) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(self.bound());
        &self.turns[start..]
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    /// Replaces the whole history, keeping only the newest turns in bound.
    pub fn replace(&mut self, turns: Vec<ConversationTurn>) {
        self.turns = turns;
        self.truncate_to_bound();
    }

    /// Pretty-printed JSON array, order preserved.
    pub fn serialize(&self) -> Result<String, AssistantError> {
        Ok(serde_json::to_string_pretty(&self.turns)?)
    }

    /// Parses a JSON array of turns. Leaves `self` untouched; callers decide
    /// whether to [`replace`](Self::replace).
    pub fn deserialize(data: &str) -> Result<Vec<ConversationTurn>, AssistantError> {
        serde_json::from_str(data)
            .map_err(|e| AssistantError::Persistence(format!("invalid conversation file: {}", e)))
    }
}
