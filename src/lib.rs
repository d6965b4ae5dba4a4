//! Interview Voice - mock interview voice client
//!
//! Records a spoken answer (optionally with a still image attached), sends
//! it with a bounded conversation tail to the interview backend, and renders
//! the transcript plus the interviewer's spoken reply.

pub mod api;
pub mod audio;
pub mod business;
pub mod chat;
pub mod data;

pub use api::HttpTurnClient;
pub use audio::{MicCapture, SpeakerPlayback};
pub use business::{TurnOrchestrator, TurnState};
pub use chat::{AttachmentSlot, ChatMessage, HistoryWindow, PendingImage, Role};
pub use data::AppConfig;
