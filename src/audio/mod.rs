//! Microphone capture and reply playback

mod capture;
mod playback;

pub use capture::{AudioSource, MicCapture, RecordedAudio};
pub use playback::{SpeakerPlayback, SpeechSink};
