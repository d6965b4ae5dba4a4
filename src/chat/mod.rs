//! Conversation state: history window and pending attachment

mod attachment;
mod history;

pub use attachment::{AttachmentSlot, PendingImage};
pub use history::{ChatMessage, HistoryWindow, Role, WireMessage, WIRE_TAIL_LEN};
