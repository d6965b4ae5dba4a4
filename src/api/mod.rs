//! Interview backend API

mod client;

pub use client::{
    HttpTurnClient, OutgoingTurn, TurnError, TurnReply, TurnService, VOICE_FILE_NAME,
};
