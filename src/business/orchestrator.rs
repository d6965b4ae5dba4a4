//! Turn Orchestrator
//!
//! Central state machine for one interview conversation. Owns the history
//! window and the attachment slot; all mutation goes through the transition
//! methods here, which is what enforces the single-in-flight-request and
//! slot/recording exclusion rules.

use anyhow::{bail, Result};
use tracing::{info, warn};

use crate::api::{OutgoingTurn, TurnReply, TurnService};
use crate::audio::{AudioSource, SpeechSink};
use crate::chat::{AttachmentSlot, ChatMessage, HistoryWindow, PendingImage, WIRE_TAIL_LEN};

/// Shown as the user's transcript when the backend returned none.
pub const TRANSCRIPT_PLACEHOLDER: &str = "...";

/// Appended as the interviewer's line when a turn request fails.
pub const TURN_FAILURE_MESSAGE: &str = "Ошибка связи. Попробуй еще раз.";

/// Conversation turn states. There is no error state: failures append a
/// message and the machine returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TurnState {
    #[default]
    Idle,
    Recording,
    Processing,
}

/// The turn state machine, generic over its three collaborators so tests
/// run without a microphone, a speaker or a network.
pub struct TurnOrchestrator<S, A, P> {
    service: S,
    capture: A,
    playback: P,
    state: TurnState,
    history: HistoryWindow,
    attachment: AttachmentSlot,
}

impl<S, A, P> TurnOrchestrator<S, A, P>
where
    S: TurnService,
    A: AudioSource,
    P: SpeechSink,
{
    pub fn new(service: S, capture: A, playback: P) -> Self {
        Self {
            service,
            capture,
            playback,
            state: TurnState::default(),
            history: HistoryWindow::new(),
            attachment: AttachmentSlot::new(),
        }
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// True exactly while a turn request is in flight.
    pub fn is_processing(&self) -> bool {
        self.state == TurnState::Processing
    }

    pub fn history(&self) -> &HistoryWindow {
        &self.history
    }

    pub fn attachment(&self) -> &AttachmentSlot {
        &self.attachment
    }

    /// Idle → Recording. A no-op outside `Idle`; an error means the
    /// microphone could not be opened and the caller must show the notice.
    pub fn start_recording(&mut self) -> Result<()> {
        if self.state != TurnState::Idle {
            tracing::debug!(state = ?self.state, "start_recording ignored");
            return Ok(());
        }

        self.capture.begin()?;
        self.state = TurnState::Recording;
        info!("recording started");
        Ok(())
    }

    /// Recording → Processing → Idle. Stops capture, sends the assembled
    /// turn, and applies the reply (or the failure message) to history.
    ///
    /// If the returned future is dropped before completion the pending
    /// response is discarded; call [`reset`](Self::reset) afterwards to
    /// release the `Processing` gate.
    pub async fn finish_recording(&mut self) -> Result<()> {
        if self.state != TurnState::Recording {
            tracing::debug!(state = ?self.state, "finish_recording ignored");
            return Ok(());
        }
        self.state = TurnState::Processing;

        let artifact = match self.capture.finish().await {
            Ok(Some(artifact)) => artifact,
            Ok(None) => {
                // Capture never materialized an artifact; nothing was said.
                self.state = TurnState::Idle;
                return Ok(());
            }
            Err(e) => {
                self.state = TurnState::Idle;
                return Err(e);
            }
        };

        // Snapshot the slot at send time: the preview goes into the user
        // message only if the image actually went out with this request.
        let sent_preview = self.attachment.pending().map(|img| img.preview.clone());
        let turn = OutgoingTurn {
            audio_wav: artifact.wav,
            image: self
                .attachment
                .pending()
                .map(|img| (img.bytes.clone(), img.file_name.clone())),
            history: self.history.wire_tail(WIRE_TAIL_LEN).collect(),
        };

        let outcome = self.service.send_turn(turn).await;
        match outcome {
            Ok(reply) => self.apply_reply(reply, sent_preview),
            Err(e) => {
                // The user's own turn is deliberately not recorded on
                // failure; only the error line appears. The attachment
                // stays pending so the next attempt can resend it.
                warn!("turn request failed: {e}");
                self.history.append(ChatMessage::ai(TURN_FAILURE_MESSAGE));
            }
        }

        self.state = TurnState::Idle;
        Ok(())
    }

    fn apply_reply(&mut self, reply: TurnReply, sent_preview: Option<String>) {
        let user_text = reply
            .user_text
            .unwrap_or_else(|| TRANSCRIPT_PLACEHOLDER.to_string());

        self.history
            .append(ChatMessage::user(user_text, sent_preview));
        self.history.append(ChatMessage::ai(reply.ai_text));

        if let Some(audio) = reply.audio_base64 {
            self.playback.play(&audio);
        }

        self.attachment.clear();
        info!(history_len = self.history.len(), "turn completed");
    }

    /// Attach an image for the next answer, replacing any pending one.
    pub fn select_image(&mut self, image: PendingImage) -> Result<()> {
        if self.state != TurnState::Idle {
            bail!("attachment is locked while recording or processing");
        }
        info!("image attached: {}", image.preview);
        self.attachment.select(image);
        Ok(())
    }

    /// Drop the pending image before it is sent.
    pub fn clear_image(&mut self) -> Result<()> {
        if self.state != TurnState::Idle {
            bail!("attachment is locked while recording or processing");
        }
        self.attachment.clear();
        Ok(())
    }

    /// Teardown path: force the machine back to `Idle`, discarding any
    /// pending bookkeeping. Does not try to abort an in-flight request;
    /// dropping the `finish_recording` future is the discard.
    pub fn reset(&mut self) {
        if self.state != TurnState::Idle {
            info!(state = ?self.state, "orchestrator reset to idle");
        }
        self.state = TurnState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::TurnError;
    use crate::audio::RecordedAudio;
    use crate::chat::Role;
    use std::cell::RefCell;
    use std::collections::VecDeque;

    struct ScriptedService {
        replies: RefCell<VecDeque<Result<TurnReply, TurnError>>>,
        seen: RefCell<Vec<OutgoingTurn>>,
    }

    impl ScriptedService {
        fn with(replies: Vec<Result<TurnReply, TurnError>>) -> Self {
            Self {
                replies: RefCell::new(replies.into()),
                seen: RefCell::new(Vec::new()),
            }
        }
    }

    impl TurnService for ScriptedService {
        async fn send_turn(&self, turn: OutgoingTurn) -> Result<TurnReply, TurnError> {
            self.seen.borrow_mut().push(turn);
            self.replies
                .borrow_mut()
                .pop_front()
                .expect("unscripted turn request")
        }
    }

    #[derive(Default)]
    struct FakeMic {
        active: bool,
        deny: bool,
    }

    impl AudioSource for FakeMic {
        fn begin(&mut self) -> Result<()> {
            if self.deny {
                bail!("no input device available");
            }
            self.active = true;
            Ok(())
        }

        async fn finish(&mut self) -> Result<Option<RecordedAudio>> {
            if !self.active {
                return Ok(None);
            }
            self.active = false;
            Ok(Some(RecordedAudio {
                wav: vec![0u8; 44],
                duration_ms: 1200,
            }))
        }

        fn is_recording(&self) -> bool {
            self.active
        }
    }

    #[derive(Default)]
    struct CountingSpeaker {
        played: RefCell<Vec<String>>,
    }

    impl SpeechSink for CountingSpeaker {
        fn play(&self, audio_base64: &str) {
            self.played.borrow_mut().push(audio_base64.to_string());
        }
    }

    type TestOrchestrator = TurnOrchestrator<ScriptedService, FakeMic, CountingSpeaker>;

    fn orchestrator(replies: Vec<Result<TurnReply, TurnError>>) -> TestOrchestrator {
        TurnOrchestrator::new(
            ScriptedService::with(replies),
            FakeMic::default(),
            CountingSpeaker::default(),
        )
    }

    fn ok_reply(user: &str, ai: &str, audio: Option<&str>) -> Result<TurnReply, TurnError> {
        Ok(TurnReply {
            user_text: Some(user.to_string()),
            ai_text: ai.to_string(),
            audio_base64: audio.map(str::to_string),
        })
    }

    fn image(name: &str) -> PendingImage {
        PendingImage {
            bytes: vec![0xde, 0xad],
            file_name: name.to_string(),
            preview: format!("/tmp/{name}"),
        }
    }

    async fn run_turn(orch: &mut TestOrchestrator) {
        orch.start_recording().unwrap();
        orch.finish_recording().await.unwrap();
    }

    #[tokio::test]
    async fn successful_turn_appends_user_then_ai() {
        let mut orch = orchestrator(vec![ok_reply("Hello", "Hi there", None)]);
        run_turn(&mut orch).await;

        let messages = orch.history().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].text, "Hello");
        assert_eq!(messages[1].role, Role::Ai);
        assert_eq!(messages[1].text, "Hi there");
        assert_eq!(orch.state(), TurnState::Idle);
        assert!(orch.playback.played.borrow().is_empty());
    }

    #[tokio::test]
    async fn failed_turn_appends_single_error_line() {
        let mut orch = orchestrator(vec![Err(TurnError::Timeout)]);
        run_turn(&mut orch).await;

        let messages = orch.history().messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, Role::Ai);
        assert_eq!(messages[0].text, TURN_FAILURE_MESSAGE);
        assert!(!orch.is_processing());
    }

    #[tokio::test]
    async fn history_grows_two_per_success_one_per_failure() {
        let mut orch = orchestrator(vec![
            ok_reply("a", "b", None),
            Err(TurnError::Timeout),
            ok_reply("c", "d", None),
        ]);
        run_turn(&mut orch).await;
        assert_eq!(orch.history().len(), 2);
        run_turn(&mut orch).await;
        assert_eq!(orch.history().len(), 3);
        run_turn(&mut orch).await;
        assert_eq!(orch.history().len(), 5);
    }

    #[tokio::test]
    async fn outgoing_history_is_bounded_to_last_ten() {
        let replies = (0..7).map(|i| ok_reply(&format!("q{i}"), &format!("a{i}"), None));
        let mut orch = orchestrator(replies.collect());

        // Six successful turns put 12 entries in the window.
        for _ in 0..6 {
            run_turn(&mut orch).await;
        }
        assert_eq!(orch.history().len(), 12);

        run_turn(&mut orch).await;

        let seen = orch.service.seen.borrow();
        let last = seen.last().unwrap();
        assert_eq!(last.history.len(), 10);
        // Last 10 of the 12 entries as they stood before request 7.
        assert_eq!(last.history[0].content, "q1");
        assert_eq!(last.history[0].role, "user");
        assert_eq!(last.history[9].content, "a5");
        assert_eq!(last.history[9].role, "assistant");
    }

    #[tokio::test]
    async fn missing_transcript_gets_placeholder() {
        let mut orch = orchestrator(vec![Ok(TurnReply {
            user_text: None,
            ai_text: "next".to_string(),
            audio_base64: None,
        })]);
        run_turn(&mut orch).await;
        assert_eq!(orch.history().messages()[0].text, TRANSCRIPT_PLACEHOLDER);
    }

    #[tokio::test]
    async fn reply_audio_goes_to_playback() {
        let mut orch = orchestrator(vec![ok_reply("a", "b", Some("AAEC"))]);
        run_turn(&mut orch).await;
        assert_eq!(orch.playback.played.borrow().as_slice(), ["AAEC"]);
    }

    #[tokio::test]
    async fn attachment_rides_along_and_clears_on_success() {
        let mut orch = orchestrator(vec![ok_reply("look", "nice", None)]);
        orch.select_image(image("cv.png")).unwrap();
        run_turn(&mut orch).await;

        let seen = orch.service.seen.borrow();
        let (bytes, name) = seen[0].image.as_ref().unwrap();
        assert_eq!(bytes, &[0xde, 0xad]);
        assert_eq!(name, "cv.png");
        drop(seen);

        assert_eq!(
            orch.history().messages()[0].image.as_deref(),
            Some("/tmp/cv.png")
        );
        assert!(orch.attachment().is_empty());
    }

    #[tokio::test]
    async fn attachment_survives_failure_for_retry() {
        let mut orch = orchestrator(vec![Err(TurnError::Timeout), ok_reply("a", "b", None)]);
        orch.select_image(image("cv.png")).unwrap();

        run_turn(&mut orch).await;
        assert!(!orch.attachment().is_empty());

        run_turn(&mut orch).await;
        assert!(orch.attachment().is_empty());
        let seen = orch.service.seen.borrow();
        assert!(seen[0].image.is_some());
        assert!(seen[1].image.is_some());
    }

    #[tokio::test]
    async fn cleared_attachment_never_leaves_the_client() {
        let mut orch = orchestrator(vec![ok_reply("a", "b", None)]);
        orch.select_image(image("cv.png")).unwrap();
        orch.clear_image().unwrap();
        run_turn(&mut orch).await;

        assert!(orch.service.seen.borrow()[0].image.is_none());
        assert!(orch.history().messages()[0].image.is_none());
    }

    #[tokio::test]
    async fn capture_denied_surfaces_notice_and_stays_idle() {
        let mut orch = orchestrator(vec![]);
        orch.capture.deny = true;

        assert!(orch.start_recording().is_err());
        assert_eq!(orch.state(), TurnState::Idle);
        assert!(orch.history().is_empty());
    }

    #[tokio::test]
    async fn processing_gates_recording_and_attachments() {
        let mut orch = orchestrator(vec![]);
        orch.state = TurnState::Processing;

        orch.start_recording().unwrap();
        assert_eq!(orch.state(), TurnState::Processing);
        assert!(orch.select_image(image("cv.png")).is_err());
        assert!(orch.clear_image().is_err());
    }

    #[tokio::test]
    async fn recording_gates_attachments() {
        let mut orch = orchestrator(vec![]);
        orch.start_recording().unwrap();
        assert!(orch.select_image(image("cv.png")).is_err());
    }

    #[tokio::test]
    async fn finish_without_recording_is_noop() {
        let mut orch = orchestrator(vec![]);
        orch.finish_recording().await.unwrap();
        assert!(orch.history().is_empty());
        assert_eq!(orch.state(), TurnState::Idle);
    }

    #[tokio::test]
    async fn reset_releases_processing_gate() {
        let mut orch = orchestrator(vec![]);
        orch.state = TurnState::Processing;
        orch.reset();
        assert_eq!(orch.state(), TurnState::Idle);
        orch.start_recording().unwrap();
        assert_eq!(orch.state(), TurnState::Recording);
    }
}
