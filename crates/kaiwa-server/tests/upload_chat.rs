//! Upload transport tests: binary and JSON endpoints against fake
//! providers, exercised in-process via `tower::ServiceExt`.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::routing::post;
use axum::Router;
use base64::Engine;
use kaiwa_server::{app, AppState};
use kaiwa_voice::{ElevenLabsConfig, OpenAiConfig};
use percent_encoding::percent_decode_str;
use serde_json::{json, Value};
use tower::ServiceExt;

const BOUNDARY: &str = "kaiwa-test-boundary";

async fn spawn_server(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router).await.unwrap();
    });
    format!("http://{}", addr)
}

fn fake_openai(transcript: &'static str, reply: &'static str) -> Router {
    Router::new()
        .route("/audio/transcriptions", post(move || async move { transcript }))
        .route(
            "/chat/completions",
            post(move || async move {
                axum::Json(json!({
                    "choices": [{"message": {"role": "assistant", "content": reply}}]
                }))
            }),
        )
}

fn fake_tts(audio: &'static [u8]) -> Router {
    Router::new().route(
        "/v1/text-to-speech/{voice}",
        post(move || async move { audio.to_vec() }),
    )
}

async fn test_app(openai: Router, tts: Router) -> Router {
    let openai_base = spawn_server(openai).await;
    let eleven_base = spawn_server(tts).await;
    app(AppState::new(
        OpenAiConfig {
            api_key: "test-key".to_string(),
            api_base: openai_base,
            ..Default::default()
        },
        ElevenLabsConfig {
            api_key: "test-key".to_string(),
            api_base: eleven_base,
            ..Default::default()
        },
    ))
}

/// Builds a multipart body with a single `audio` file field.
fn multipart_body(audio: &[u8]) -> Vec<u8> {
    let mut body = Vec::new();
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\n\
             Content-Disposition: form-data; name=\"audio\"; filename=\"clip.m4a\"\r\n\
             Content-Type: audio/mp4\r\n\r\n"
        )
        .as_bytes(),
    );
    body.extend_from_slice(audio);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn upload_request(uri: &str, audio: &[u8]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(audio)))
        .unwrap()
}

fn decode_header(response: &axum::response::Response, name: &str) -> String {
    let raw = response.headers()[name].to_str().unwrap();
    percent_decode_str(raw).decode_utf8().unwrap().into_owned()
}

#[tokio::test]
async fn binary_endpoint_returns_audio_with_text_headers() {
    let app = test_app(
        fake_openai("こんにちは", "こんにちは、元気ですか？"),
        fake_tts(&[0, 1]),
    )
    .await;

    let response = app
        .oneshot(upload_request("/api/chat/audio", b"fake-audio"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
    assert_eq!(decode_header(&response, "X-Transcript"), "こんにちは");
    assert_eq!(decode_header(&response, "X-Reply"), "こんにちは、元気ですか？");

    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert_eq!(body.as_ref(), &[0u8, 1u8]);
}

#[tokio::test]
async fn json_endpoint_returns_envelope() {
    let app = test_app(
        fake_openai("こんにちは", "こんにちは、元気ですか？"),
        fake_tts(&[0, 1]),
    )
    .await;

    let response = app
        .oneshot(upload_request("/api/chat/audio/json", b"fake-audio"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["transcript"], "こんにちは");
    assert_eq!(json["reply"], "こんにちは、元気ですか？");
    assert_eq!(json["audio_base64"], "AAE=");

    let decoded = base64::engine::general_purpose::STANDARD
        .decode(json["audio_base64"].as_str().unwrap())
        .unwrap();
    assert_eq!(decoded, vec![0u8, 1u8]);
}

#[tokio::test]
async fn both_endpoints_report_identical_text() {
    let openai = fake_openai("天気はどうですか", "今日は晴れです。");
    let tts = fake_tts(&[9, 9, 9]);
    let app = test_app(openai, tts).await;

    let binary = app
        .clone()
        .oneshot(upload_request("/api/chat/audio", b"fake-audio"))
        .await
        .unwrap();
    let transcript_header = decode_header(&binary, "X-Transcript");
    let reply_header = decode_header(&binary, "X-Reply");

    let json_response = app
        .oneshot(upload_request("/api/chat/audio/json", b"fake-audio"))
        .await
        .unwrap();
    let body = axum::body::to_bytes(json_response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();

    // Encoding differs between the two surfaces, content does not.
    assert_eq!(json["transcript"], transcript_header.as_str());
    assert_eq!(json["reply"], reply_header.as_str());
}

#[tokio::test]
async fn transcription_failure_maps_to_500_with_detail() {
    let openai = Router::new().route(
        "/audio/transcriptions",
        post(|| async { (StatusCode::BAD_REQUEST, "could not decode audio") }),
    );
    let app = test_app(openai, fake_tts(&[1])).await;

    let response = app
        .oneshot(upload_request("/api/chat/audio", b"not-audio"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert!(json["detail"]
        .as_str()
        .unwrap()
        .contains("could not decode audio"));
}

#[tokio::test]
async fn synthesis_failure_returns_no_partial_results() {
    let openai = fake_openai("transcript", "reply");
    let tts = Router::new().route(
        "/v1/text-to-speech/{voice}",
        post(|| async { (StatusCode::BAD_GATEWAY, "voice backend offline") }),
    );
    let app = test_app(openai, tts).await;

    let response = app
        .oneshot(upload_request("/api/chat/audio/json", b"fake-audio"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    // The error carries the failure detail and nothing else: no
    // transcript or reply leaks out of a failed turn.
    assert!(json["detail"].as_str().unwrap().contains("voice backend offline"));
    assert!(json.get("transcript").is_none());
    assert!(json.get("reply").is_none());
    assert!(json.get("audio_base64").is_none());
}

#[tokio::test]
async fn voices_endpoint_lists_catalog() {
    let tts = fake_tts(&[1]).route(
        "/v1/voices",
        axum::routing::get(|| async {
            axum::Json(json!({
                "voices": [{"voice_id": "21m00Tcm4TlvDq8ikWAM", "name": "Rachel"}]
            }))
        }),
    );
    let app = test_app(fake_openai("t", "r"), tts).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/voices")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json["voices"][0]["name"], "Rachel");
}

#[tokio::test]
async fn missing_audio_field_is_a_bad_request() {
    let app = test_app(fake_openai("t", "r"), fake_tts(&[1])).await;

    let body = format!(
        "--{BOUNDARY}\r\n\
         Content-Disposition: form-data; name=\"other\"\r\n\r\n\
         value\r\n--{BOUNDARY}--\r\n"
    );
    let request = Request::builder()
        .method("POST")
        .uri("/api/chat/audio")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(body))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn empty_audio_field_is_a_bad_request() {
    let app = test_app(fake_openai("t", "r"), fake_tts(&[1])).await;

    let response = app
        .oneshot(upload_request("/api/chat/audio", b""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
