//! Reply Speech Playback
//!
//! Best-effort playback of the interviewer's synthesized speech. Every
//! failure here (bad base64, no output device, undecodable audio, autoplay
//! refusal) is logged and swallowed; playback can never affect the turn
//! state machine.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::io::Cursor;
use std::thread;

/// Fire-and-forget sink for synthesized speech.
pub trait SpeechSink {
    /// Decode and play a base64 audio payload. Never blocks, never fails.
    fn play(&self, audio_base64: &str);
}

/// rodio-backed [`SpeechSink`]; plays on a detached thread.
#[derive(Debug, Default)]
pub struct SpeakerPlayback;

impl SpeakerPlayback {
    pub fn new() -> Self {
        Self
    }
}

impl SpeechSink for SpeakerPlayback {
    fn play(&self, audio_base64: &str) {
        let bytes = match BASE64.decode(audio_base64) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!("reply audio is not valid base64: {e}");
                return;
            }
        };

        if bytes.is_empty() {
            tracing::debug!("reply carried empty audio, skipping playback");
            return;
        }

        // The output stream is not Send, so it lives entirely on the
        // playback thread.
        thread::spawn(move || {
            if let Err(e) = play_blocking(bytes) {
                tracing::warn!("reply playback failed: {e}");
            }
        });
    }
}

fn play_blocking(bytes: Vec<u8>) -> anyhow::Result<()> {
    let (_stream, handle) = rodio::OutputStream::try_default()?;
    let sink = rodio::Sink::try_new(&handle)?;
    let source = rodio::Decoder::new(Cursor::new(bytes))?;
    sink.append(source);
    sink.sleep_until_end();
    Ok(())
}
