//! Conversation transcript
//!
//! An ordered, append-only sequence of [`ChatTurn`]s. The only record that may
//! still change is the assistant turn being streamed right now; it is sealed
//! as soon as the turn reaches a terminal state or another record is appended.

use crate::{Result, TreeholeError};
use serde::{Deserialize, Serialize};

/// Who produced a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Role {
    /// The person typing
    User,
    /// The character replying
    Assistant,
}

impl Role {
    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

// Anything that is not explicitly the user renders as the character.
impl From<String> for Role {
    fn from(value: String) -> Self {
        if value.eq_ignore_ascii_case("user") {
            Role::User
        } else {
            Role::Assistant
        }
    }
}

/// One utterance in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    /// Author
    pub role: Role,
    /// Text content
    #[serde(default)]
    pub content: String,
}

impl ChatTurn {
    /// A user turn
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    /// An assistant turn
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered turns of one conversation
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    turns: Vec<ChatTurn>,
    open: bool,
}

impl Transcript {
    /// Empty transcript
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a complete turn, sealing any open assistant record first
    pub fn push(&mut self, turn: ChatTurn) {
        self.open = false;
        self.turns.push(turn);
    }

    /// Append an assistant record that keeps growing until [`seal`](Self::seal)
    pub fn open_assistant(&mut self, initial: impl Into<String>) {
        self.push(ChatTurn::assistant(initial));
        self.open = true;
    }

    /// Extend the open assistant record
    pub fn append_to_open(&mut self, text: &str) -> Result<()> {
        if !self.open {
            return Err(TreeholeError::other("No open assistant turn to extend"));
        }
        match self.turns.last_mut() {
            Some(turn) => {
                turn.content.push_str(text);
                Ok(())
            }
            None => Err(TreeholeError::other("No open assistant turn to extend")),
        }
    }

    /// Freeze the open record, if any
    pub fn seal(&mut self) {
        self.open = false;
    }

    /// Whether an assistant record is still growing
    pub fn has_open_turn(&self) -> bool {
        self.open
    }

    /// All turns in order
    pub fn turns(&self) -> &[ChatTurn] {
        &self.turns
    }

    /// Most recent turn
    pub fn last(&self) -> Option<&ChatTurn> {
        self.turns.last()
    }

    /// Number of turns
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// Whether the transcript has no turns
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}
