//! Turn pipeline: reply generation followed by speech synthesis.
//!
//! One turn moves through `GeneratingReply → Synthesizing → Done`, or
//! straight to failure when a stage errors. Progress notifications are
//! written to an explicit channel supplied by the transport; delivery
//! is fire-and-forget and never affects the pipeline's own control
//! flow, while adapter failures always abort the turn.

use kaiwa_voice::{ChatClient, SynthesisOptions, TtsClient, VoiceError};
use tokio::sync::mpsc;

/// Status notification emitted before the reply-generation stage.
pub const STATUS_GENERATING: &str = "応答を生成中...";

/// Status notification emitted before the synthesis stage.
pub const STATUS_SYNTHESIZING: &str = "音声を生成中...";

/// Ephemeral status notification for one pipeline stage.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
}

/// Terminal artifact of one successful turn.
#[derive(Debug)]
pub struct PipelineResult {
    /// The generated reply, exactly as the generation stage returned it.
    pub reply: String,
    /// MP3 audio rendering of the reply.
    pub audio: Vec<u8>,
}

/// Orchestrates one chat turn across the remote adapters.
///
/// Holds no mutable state; constructed once at startup and shared by
/// all connections.
pub struct ChatPipeline {
    chat: ChatClient,
    tts: TtsClient,
}

impl ChatPipeline {
    pub fn new(chat: ChatClient, tts: TtsClient) -> Self {
        Self { chat, tts }
    }

    /// Runs one turn: generate a reply for `user_text`, then synthesize
    /// it. A progress event is sent before each stage; the transport
    /// owns the terminal "complete" notification.
    ///
    /// The first stage failure aborts the turn and propagates
    /// unmodified. Nothing is written to `progress` after a failure.
    pub async fn run(
        &self,
        user_text: &str,
        progress: mpsc::Sender<ProgressEvent>,
    ) -> Result<PipelineResult, VoiceError> {
        notify(&progress, STATUS_GENERATING).await;
        tracing::info!(chars = user_text.chars().count(), "generating reply");
        let reply = self.chat.generate_reply(user_text, &[], None).await?;

        notify(&progress, STATUS_SYNTHESIZING).await;
        tracing::info!(chars = reply.chars().count(), "synthesizing reply audio");
        let audio = self
            .tts
            .synthesize(&reply, &SynthesisOptions::default())
            .await?;
        tracing::info!(bytes = audio.len(), "turn complete");

        Ok(PipelineResult { reply, audio })
    }
}

/// Sends a progress event, logging and swallowing delivery failures.
/// A closed or full notification channel must not abort the stage in
/// progress.
async fn notify(progress: &mpsc::Sender<ProgressEvent>, message: &str) {
    let event = ProgressEvent {
        message: message.to_string(),
    };
    if let Err(e) = progress.send(event).await {
        tracing::warn!("dropping progress notification (receiver gone): {}", e);
    }
}
