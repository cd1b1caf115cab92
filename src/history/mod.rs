//! Conversation state: an append-only, ordered list of turns.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Agent,
}

/// Rendered outcome attached to an agent turn, kept alongside the prose so
/// later prompts can refer back to what was actually computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub rendered: String,
    pub rows: Option<usize>,
    pub cols: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    pub result: Option<TurnResult>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: TurnRole::User, text: text.into(), result: None }
    }

    pub fn agent(text: impl Into<String>, result: Option<TurnResult>) -> Self {
        Self { role: TurnRole::Agent, text: text.into(), result }
    }
}

/// Turns are only ever appended in submission order; `clear` is the one way
/// to forget.
#[derive(Debug, Default)]
pub struct ConversationLog {
    turns: Vec<ConversationTurn>,
}

impl ConversationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    /// The last `limit` turns, oldest first.
    pub fn history(&self, limit: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(limit);
        &self.turns[start..]
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
