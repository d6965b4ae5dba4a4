//! Business logic: the turn state machine

mod orchestrator;

pub use orchestrator::{
    TurnOrchestrator, TurnState, TRANSCRIPT_PLACEHOLDER, TURN_FAILURE_MESSAGE,
};
