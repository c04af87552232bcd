//! HTTP upload transports: one audio blob in, one complete response out.
//!
//! Both endpoints run the same three-stage chain (transcribe → generate
//! → synthesize) and differ only in the response encoding: raw MP3 with
//! text side channels in headers, or a JSON envelope. A failure at any
//! stage yields a single error response with no partial data.

use crate::api::ApiError;
use crate::pipeline::PipelineResult;
use crate::AppState;
use axum::{
    body::Body,
    extract::{Extension, Multipart},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use base64::Engine;
use kaiwa_voice::VoiceError;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Multipart field carrying the audio upload.
const AUDIO_FIELD: &str = "audio";

/// JSON envelope for `POST /api/chat/audio/json`.
#[derive(Debug, Serialize)]
pub struct ChatAudioResponse {
    pub transcript: String,
    pub reply: String,
    pub audio_base64: String,
}

/// Extracts the `audio` field from a multipart upload.
async fn read_audio_field(
    multipart: &mut Multipart,
) -> Result<(Vec<u8>, Option<String>), ApiError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("multipart error: {}", e)))?
    {
        if field.name() != Some(AUDIO_FIELD) {
            continue;
        }

        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| ApiError::BadRequest(format!("failed to read upload: {}", e)))?;

        if data.is_empty() {
            return Err(ApiError::BadRequest("audio field is empty".to_string()));
        }

        return Ok((data.to_vec(), filename));
    }

    Err(ApiError::BadRequest(format!(
        "missing multipart field: {}",
        AUDIO_FIELD
    )))
}

/// Runs transcription and then the reply pipeline for one upload.
///
/// There is no streaming side channel on this path: the progress
/// receiver is dropped immediately and the pipeline's notification
/// sends are swallowed.
async fn run_turn(
    state: &Arc<AppState>,
    audio: &[u8],
    filename: Option<&str>,
) -> Result<(String, PipelineResult), VoiceError> {
    let transcript = state.stt.transcribe(audio, filename).await?;
    tracing::info!(chars = transcript.chars().count(), "transcribed upload");

    let (progress_tx, progress_rx) = mpsc::channel(4);
    drop(progress_rx);
    let result = state.pipeline.run(&transcript, progress_tx).await?;

    Ok((transcript, result))
}

/// Percent-encodes a UTF-8 string for use in a response header.
fn encode_header_value(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

/// Handler for `POST /api/chat/audio`.
///
/// Responds with the raw MP3 body; the transcript and reply travel in
/// the percent-encoded `X-Transcript` and `X-Reply` headers.
pub async fn chat_audio_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let (audio, filename) = read_audio_field(&mut multipart).await?;
    let (transcript, result) = run_turn(&state, &audio, filename.as_deref()).await?;

    Response::builder()
        .header(header::CONTENT_TYPE, "audio/mpeg")
        .header("X-Transcript", encode_header_value(&transcript))
        .header("X-Reply", encode_header_value(&result.reply))
        .body(Body::from(result.audio))
        .map_err(|e| ApiError::Internal(format!("failed to build response: {}", e)))
}

/// Handler for `POST /api/chat/audio/json`.
///
/// Same turn as [`chat_audio_handler`], returned as a JSON envelope
/// with the audio base64-encoded.
pub async fn chat_audio_json_handler(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<Response, ApiError> {
    let (audio, filename) = read_audio_field(&mut multipart).await?;
    let (transcript, result) = run_turn(&state, &audio, filename.as_deref()).await?;

    let audio_base64 = base64::engine::general_purpose::STANDARD.encode(&result.audio);
    Ok(Json(ChatAudioResponse {
        transcript,
        reply: result.reply,
        audio_base64,
    })
    .into_response())
}
