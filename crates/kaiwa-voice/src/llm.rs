use crate::config::OpenAiConfig;
use crate::error::VoiceError;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;

/// Default persona for the voice assistant. Keeps replies short,
/// speakable, and markdown-free so they can be read aloud. Callers may
/// substitute their own prompt per call.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
あなたは親切で自然な音声アシスタントです。

以下のガイドラインに従って応答してください：
- 簡潔で自然な日本語で応答する
- 音声で聞いて理解しやすい表現を使う
- 長すぎる応答は避け、2-3文程度にまとめる
- 箇条書きやマークダウンは使わない（音声で読み上げるため）
- 親しみやすく、丁寧な口調を維持する
";

/// Generation budget keeping replies conversational. Enforced by the
/// remote model's parameters, not validated locally.
const MAX_REPLY_TOKENS: u32 = 300;
const TEMPERATURE: f64 = 0.7;

/// Timeout for a completion request.
const LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// One message in a chat exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: CompletionMessage,
}

#[derive(Debug, Deserialize)]
struct CompletionMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Assembles the message list for one completion call: system prompt,
/// then history in chronological order, then the new user turn.
fn build_messages(
    user_text: &str,
    history: &[ChatMessage],
    system_prompt: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages =
        vec![ChatMessage::system(system_prompt.unwrap_or(DEFAULT_SYSTEM_PROMPT))];
    messages.extend_from_slice(history);
    messages.push(ChatMessage::user(user_text));
    messages
}

/// Reply-generation adapter backed by the OpenAI chat completions API.
#[derive(Debug, Clone)]
pub struct ChatClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl ChatClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Generates a reply to the user's message. `history`, when
    /// non-empty, is prepended to the new turn; an empty slice makes
    /// this a stateless single-turn call.
    pub async fn generate_reply(
        &self,
        user_text: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> Result<String, VoiceError> {
        let body = json!({
            "model": self.config.chat_model,
            "messages": build_messages(user_text, history, system_prompt),
            "max_tokens": MAX_REPLY_TOKENS,
            "temperature": TEMPERATURE,
        });

        let url = format!("{}/chat/completions", self.config.api_base);
        tracing::debug!(model = %self.config.chat_model, history_len = history.len(), "requesting completion");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .timeout(LLM_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Generation(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Generation(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        let completion: CompletionResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Generation(format!("failed to parse response: {}", e)))?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| VoiceError::Generation("response contained no choices".to_string()))?;

        Ok(content.trim().to_string())
    }

    /// Streaming variant: yields reply text chunks as they arrive from
    /// the provider's SSE stream. Same inputs as
    /// [`ChatClient::generate_reply`]; intended for progressive
    /// transports rather than the default buffered pipeline path.
    pub fn generate_reply_stream(
        &self,
        user_text: &str,
        history: &[ChatMessage],
        system_prompt: Option<&str>,
    ) -> impl Stream<Item = Result<String, VoiceError>> + Send + 'static {
        let body = json!({
            "model": self.config.chat_model,
            "messages": build_messages(user_text, history, system_prompt),
            "max_tokens": MAX_REPLY_TOKENS,
            "temperature": TEMPERATURE,
            "stream": true,
        });

        let url = format!("{}/chat/completions", self.config.api_base);
        let request = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .timeout(LLM_TIMEOUT);

        async_stream::try_stream! {
            let response = request
                .send()
                .await
                .map_err(|e| VoiceError::Generation(format!("request failed: {}", e)))?;

            if !response.status().is_success() {
                let status = response.status();
                let detail = response.text().await.unwrap_or_default();
                Err(VoiceError::Generation(format!(
                    "provider returned {}: {}",
                    status, detail
                )))?;
                return;
            }

            let mut bytes = response.bytes_stream();
            let mut buffer = String::new();

            while let Some(chunk) = bytes.next().await {
                let chunk = chunk
                    .map_err(|e| VoiceError::Generation(format!("stream error: {}", e)))?;
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                while let Some(pos) = buffer.find('\n') {
                    let line: String = buffer.drain(..=pos).collect();
                    if let Some(content) = parse_sse_line(line.trim())? {
                        yield content;
                    }
                }
            }
        }
    }
}

/// Parses one SSE line from a streaming completion response. Returns
/// `Ok(Some(text))` for a chunk carrying content, `Ok(None)` for
/// keep-alives, empty deltas, and the `[DONE]` sentinel.
fn parse_sse_line(line: &str) -> Result<Option<String>, VoiceError> {
    let Some(data) = line.strip_prefix("data:") else {
        return Ok(None);
    };
    let data = data.trim();
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }

    let chunk: StreamChunk = serde_json::from_str(data)
        .map_err(|e| VoiceError::Generation(format!("failed to parse stream chunk: {}", e)))?;

    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}
