//! Conversation History
//!
//! Append-only log of completed interview turns. The full window (including
//! image references) is kept for display; only a bounded tail in a reduced
//! wire shape ever leaves the process.

use serde::Serialize;

/// Maximum number of history entries included in an outgoing request.
pub const WIRE_TAIL_LEN: usize = 10;

/// Who produced a conversational turn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Ai,
}

impl Role {
    /// Role name used on the wire; the backend expects OpenAI-style roles.
    pub fn wire_name(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Ai => "assistant",
        }
    }
}

/// One completed conversational turn.
///
/// Created only by the orchestrator after a request/response cycle and
/// immutable afterwards. `image` is the display reference of an attachment
/// that went out with a user turn; it never appears in the wire form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: Role,
    pub text: String,
    pub image: Option<String>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>, image: Option<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
            image,
        }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            role: Role::Ai,
            text: text.into(),
            image: None,
        }
    }
}

/// Reduced `{role, content}` projection sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
}

/// Ordered, append-only window over the session's turns.
///
/// Unbounded on the retention side; only the outgoing projection is capped
/// at [`WIRE_TAIL_LEN`]. Insertion order is conversational order.
#[derive(Debug, Default)]
pub struct HistoryWindow {
    messages: Vec<ChatMessage>,
}

impl HistoryWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Last `n` entries in chronological order, mapped to the wire shape.
    /// Each call yields a fresh iterator over the window as it stands now.
    pub fn wire_tail(&self, n: usize) -> impl Iterator<Item = WireMessage> + '_ {
        let skip = self.messages.len().saturating_sub(n);
        self.messages.iter().skip(skip).map(|m| WireMessage {
            role: m.role.wire_name(),
            content: m.text.clone(),
        })
    }
}
