//! Kaiwa server library logic.
//!
//! Wires the voice pipeline (reply generation + speech synthesis) and
//! the speech-to-text adapter into an axum application with two
//! transport surfaces: a WebSocket chat endpoint streaming typed frames
//! and HTTP multipart upload endpoints returning a complete response.

pub mod api;
pub mod api_chat;
pub mod api_ws;
pub mod config;
pub mod pipeline;

use axum::{extract::DefaultBodyLimit, routing::get, routing::post, Extension, Json, Router};
use kaiwa_voice::{ChatClient, ElevenLabsConfig, OpenAiConfig, SttClient, TtsClient};
use pipeline::ChatPipeline;
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Maximum request body size for plain API routes (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Maximum request body size for audio upload routes (25 MiB, matching
/// the transcription provider's own upload ceiling).
const MAX_UPLOAD_BODY_BYTES: usize = 25 * 1024 * 1024;

/// Application state shared across all request handlers.
///
/// Everything here is read-only after startup; handlers share it via
/// `Arc` with no mutable state between turns.
#[derive(Clone)]
pub struct AppState {
    /// Reply-generation + synthesis pipeline.
    pub pipeline: Arc<ChatPipeline>,
    /// Speech-to-text adapter, used by the upload transports.
    pub stt: Arc<SttClient>,
    /// Synthesis adapter handle for the voice catalog endpoint.
    pub tts: Arc<TtsClient>,
}

impl AppState {
    /// Builds the shared state from provider configuration, constructing
    /// one adapter instance per provider and injecting them into the
    /// pipeline.
    pub fn new(openai: OpenAiConfig, elevenlabs: ElevenLabsConfig) -> Self {
        let chat = ChatClient::new(openai.clone());
        let tts = TtsClient::new(elevenlabs);
        Self {
            pipeline: Arc::new(ChatPipeline::new(chat, tts.clone())),
            stt: Arc::new(SttClient::new(openai)),
            tts: Arc::new(tts),
        }
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    // Upload routes need a larger body limit for audio payloads.
    let upload_routes = Router::new()
        .route("/api/chat/audio", post(api_chat::chat_audio_handler))
        .route(
            "/api/chat/audio/json",
            post(api_chat::chat_audio_json_handler),
        )
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BODY_BYTES));

    Router::new()
        .route("/health", get(health))
        .route("/api/voices", get(api::voices_handler))
        .merge(upload_routes)
        .route("/ws", get(api_ws::ws_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
