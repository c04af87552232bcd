//! WebSocket chat transport.
//!
//! One text message in, one turn out: the handler extracts the user's
//! text, drives the pipeline with a progress channel bridged to
//! `status` frames, then emits `reply`, `audio`, and a terminal
//! `status` frame. A failed turn produces exactly one `error` frame and
//! the connection keeps accepting further turns.

use crate::pipeline::ProgressEvent;
use crate::AppState;
use axum::{
    extract::{
        ws::{Message as WsMessage, WebSocket},
        Extension, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Terminal status frame message for a completed turn.
pub const STATUS_COMPLETE: &str = "処理完了";

/// Error frame message for an empty inbound text.
const ERR_EMPTY_TEXT: &str = "テキストが空です";

/// Outgoing WebSocket frames, tagged by a `type` field.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum OutgoingFrame {
    #[serde(rename = "status")]
    Status { message: String },
    #[serde(rename = "reply")]
    Reply { data: String },
    #[serde(rename = "audio")]
    Audio { data: String, format: &'static str },
    #[serde(rename = "error")]
    Error { message: String },
}

/// WebSocket handler: `GET /ws`.
pub async fn ws_handler(
    Extension(state): Extension<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Extracts the user's text from one inbound payload: the `text` field
/// of a JSON object, the contents of a bare JSON string, or the raw
/// payload when it is not valid JSON.
fn extract_text(raw: &str) -> String {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map
            .get("text")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        Ok(Value::String(s)) => s,
        _ => raw.to_string(),
    }
}

/// Serializes a frame and queues it on the outbound channel. Queue
/// failures are logged, not propagated: a slow or gone client must not
/// disturb the turn in progress.
fn send_frame(tx: &mpsc::Sender<String>, frame: &OutgoingFrame) {
    match serde_json::to_string(frame) {
        Ok(json) => {
            if let Err(e) = tx.try_send(json) {
                tracing::warn!("failed to queue websocket frame: {}", e);
            }
        }
        Err(e) => {
            tracing::error!("failed to serialize websocket frame: {}", e);
        }
    }
}

/// Handles one WebSocket connection: a receive loop processing one turn
/// at a time until the client disconnects.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();

    // Bounded outbound channel with a dedicated forward task, so frame
    // producers never hold the socket sink across a turn.
    let (tx, mut rx) = mpsc::channel::<String>(64);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(WsMessage::Text(msg.into())).await.is_err() {
                break;
            }
        }
    });

    tracing::info!("websocket connection established");

    loop {
        match receiver.next().await {
            Some(Ok(WsMessage::Text(raw))) => {
                let user_text = extract_text(&raw);
                if user_text.is_empty() {
                    send_frame(
                        &tx,
                        &OutgoingFrame::Error {
                            message: ERR_EMPTY_TEXT.to_string(),
                        },
                    );
                    continue;
                }
                process_turn(&state, &tx, &user_text).await;
            }
            Some(Ok(WsMessage::Close(_))) | None => break,
            Some(Ok(_)) => {
                // Binary and ping/pong frames carry no turn input.
            }
            Some(Err(e)) => {
                tracing::error!("websocket transport error: {}", e);
                // Best effort; the connection is going away either way.
                send_frame(
                    &tx,
                    &OutgoingFrame::Error {
                        message: format!("接続エラー: {}", e),
                    },
                );
                break;
            }
        }
    }

    // Let the forward task flush anything still queued, then exit.
    drop(tx);
    if let Err(e) = send_task.await {
        tracing::warn!("websocket send task ended abnormally: {}", e);
    }

    tracing::info!("websocket connection closed");
}

/// Runs one turn and emits its frames in order: pipeline statuses, then
/// `reply`, `audio`, and the terminal `status`; or a single `error`
/// frame on failure.
async fn process_turn(state: &Arc<AppState>, tx: &mpsc::Sender<String>, user_text: &str) {
    let (progress_tx, mut progress_rx) = mpsc::channel::<ProgressEvent>(16);

    // Bridge pipeline progress events to status frames.
    let out = tx.clone();
    let forward_task = tokio::spawn(async move {
        while let Some(event) = progress_rx.recv().await {
            send_frame(
                &out,
                &OutgoingFrame::Status {
                    message: event.message,
                },
            );
        }
    });

    let result = state.pipeline.run(user_text, progress_tx).await;

    // The pipeline dropped its sender; wait for the bridge to drain so
    // every status frame is queued ahead of the frames below.
    if let Err(e) = forward_task.await {
        tracing::warn!("progress bridge task ended abnormally: {}", e);
    }

    match result {
        Ok(result) => {
            send_frame(tx, &OutgoingFrame::Reply { data: result.reply });

            let encoded = base64::engine::general_purpose::STANDARD.encode(&result.audio);
            send_frame(
                tx,
                &OutgoingFrame::Audio {
                    data: encoded,
                    format: "mp3",
                },
            );

            send_frame(
                tx,
                &OutgoingFrame::Status {
                    message: STATUS_COMPLETE.to_string(),
                },
            );
        }
        Err(e) => {
            tracing::error!("turn failed: {}", e);
            send_frame(
                tx,
                &OutgoingFrame::Error {
                    message: format!("処理中にエラーが発生しました: {}", e),
                },
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_text_from_json_object() {
        assert_eq!(extract_text(r#"{"text": "こんにちは"}"#), "こんにちは");
    }

    #[test]
    fn extract_text_missing_field_is_empty() {
        assert_eq!(extract_text(r#"{"other": "x"}"#), "");
    }

    #[test]
    fn extract_text_from_bare_json_string() {
        assert_eq!(extract_text(r#""hello""#), "hello");
    }

    #[test]
    fn extract_text_falls_back_to_raw_payload() {
        assert_eq!(extract_text("plain words"), "plain words");
    }

    #[test]
    fn frames_serialize_with_type_tag() {
        let frame = OutgoingFrame::Audio {
            data: "AAE=".to_string(),
            format: "mp3",
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "audio");
        assert_eq!(json["data"], "AAE=");
        assert_eq!(json["format"], "mp3");

        let frame = OutgoingFrame::Status {
            message: STATUS_COMPLETE.to_string(),
        };
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["message"], "処理完了");
    }
}
