//! Remote Turn Service Client
//!
//! One multipart request per completed answer: the recorded WAV, an optional
//! image, and a JSON-encoded tail of the conversation. The backend replies
//! with the transcript, the interviewer's text and optional synthesized
//! speech.

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use thiserror::Error;

use crate::chat::WireMessage;
use crate::data::ServerConfig;

/// Filename the backend expects for the audio part.
pub const VOICE_FILE_NAME: &str = "voice.wav";

/// Everything a single turn request carries.
#[derive(Debug, Clone)]
pub struct OutgoingTurn {
    /// Finished WAV artifact from the capture session.
    pub audio_wav: Vec<u8>,
    /// Raw image bytes plus reported filename, if one was attached.
    pub image: Option<(Vec<u8>, String)>,
    /// Bounded history tail, already in wire shape.
    pub history: Vec<WireMessage>,
}

/// Successful turn reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReply {
    /// Transcript of the user's audio; absent when the backend produced none.
    pub user_text: Option<String>,
    /// The interviewer's textual reply.
    pub ai_text: String,
    /// Base64-encoded speech audio, when synthesis succeeded.
    pub audio_base64: Option<String>,
}

/// Recoverable failures of a turn request. All of these resolve to the same
/// behavior upstream: one error message in the history, slot kept for retry.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("turn request failed: {0}")]
    Transport(reqwest::Error),
    #[error("turn request timed out")]
    Timeout,
    #[error("server returned {0}")]
    Status(StatusCode),
    #[error("malformed turn response: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for TurnError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TurnError::Timeout
        } else {
            TurnError::Transport(err)
        }
    }
}

/// Seam between the orchestrator and the backend, so turn handling can be
/// exercised without a network.
#[allow(async_fn_in_trait)]
pub trait TurnService {
    async fn send_turn(&self, turn: OutgoingTurn) -> Result<TurnReply, TurnError>;
}

/// Raw response body; `ai_text` is validated after decoding.
#[derive(Debug, Deserialize)]
struct RawTurnReply {
    user_text: Option<String>,
    ai_text: Option<String>,
    audio_base64: Option<String>,
}

/// reqwest-backed [`TurnService`] implementation.
pub struct HttpTurnClient {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpTurnClient {
    pub fn new(config: &ServerConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let endpoint = format!(
            "{}{}",
            config.base_url.trim_end_matches('/'),
            config.turn_path
        );
        Ok(Self { http, endpoint })
    }

    fn build_form(turn: OutgoingTurn) -> Result<Form, TurnError> {
        let audio = Part::bytes(turn.audio_wav)
            .file_name(VOICE_FILE_NAME)
            .mime_str("audio/wav")
            .map_err(TurnError::Transport)?;

        let history = serde_json::to_string(&turn.history)
            .map_err(|e| TurnError::Malformed(format!("history encoding: {e}")))?;

        let mut form = Form::new().part("file", audio).text("history", history);

        if let Some((bytes, file_name)) = turn.image {
            form = form.part("image", Part::bytes(bytes).file_name(file_name));
        }

        Ok(form)
    }
}

impl TurnService for HttpTurnClient {
    async fn send_turn(&self, turn: OutgoingTurn) -> Result<TurnReply, TurnError> {
        let form = Self::build_form(turn)?;

        tracing::debug!("sending turn request to {}", self.endpoint);
        let response = self.http.post(&self.endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TurnError::Status(status));
        }

        let raw: RawTurnReply = response
            .json()
            .await
            .map_err(|e| TurnError::Malformed(e.to_string()))?;

        parse_reply(raw)
    }
}

fn parse_reply(raw: RawTurnReply) -> Result<TurnReply, TurnError> {
    let ai_text = match raw.ai_text {
        Some(text) if !text.is_empty() => text,
        _ => return Err(TurnError::Malformed("missing ai_text".to_string())),
    };

    Ok(TurnReply {
        user_text: raw.user_text,
        ai_text,
        // gTTS failures show up as an empty string; treat that as no audio.
        audio_base64: raw.audio_base64.filter(|a| !a.is_empty()),
    })
}
