use crate::config::ElevenLabsConfig;
use crate::error::VoiceError;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

/// Maximum text input size for synthesis (64 KiB). Prevents resource
/// exhaustion from oversized synthesis requests.
const MAX_TTS_INPUT_BYTES: usize = 64 * 1024;

/// Timeout for a buffered synthesis request.
const TTS_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for a streaming synthesis request.
const TTS_STREAM_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for the voice catalog request.
const VOICES_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-call synthesis parameters. `None` fields fall back to the
/// configured defaults.
#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub voice_id: Option<String>,
    pub model_id: Option<String>,
    pub stability: f64,
    pub similarity_boost: f64,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            voice_id: None,
            model_id: None,
            stability: 0.5,
            similarity_boost: 0.75,
        }
    }
}

/// One entry from the provider's voice catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceInfo {
    pub voice_id: String,
    pub name: String,
    #[serde(default)]
    pub category: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VoicesResponse {
    #[serde(default)]
    voices: Vec<VoiceInfo>,
}

/// Speech-synthesis adapter backed by the ElevenLabs API.
///
/// Produces MP3 (`audio/mpeg`) payloads. A missing API key fails on
/// first use rather than at startup.
#[derive(Debug, Clone)]
pub struct TtsClient {
    http: reqwest::Client,
    config: ElevenLabsConfig,
}

impl TtsClient {
    pub fn new(config: ElevenLabsConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Synthesizes speech from text, buffering the full MP3 payload.
    pub async fn synthesize(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<Vec<u8>, VoiceError> {
        self.check_input(text)?;

        let url = format!(
            "{}/v1/text-to-speech/{}",
            self.config.api_base,
            self.resolve_voice(options)
        );
        let response = self
            .post_synthesis(&url, text, options, TTS_TIMEOUT)
            .await?;

        let audio = response
            .bytes()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to read audio body: {}", e)))?;

        Ok(audio.to_vec())
    }

    /// Streaming variant: yields MP3 chunks as they arrive, for
    /// transports that can forward audio incrementally.
    pub async fn synthesize_stream(
        &self,
        text: &str,
        options: &SynthesisOptions,
    ) -> Result<impl Stream<Item = Result<Bytes, VoiceError>> + Send + 'static, VoiceError> {
        self.check_input(text)?;

        let url = format!(
            "{}/v1/text-to-speech/{}/stream",
            self.config.api_base,
            self.resolve_voice(options)
        );
        let response = self
            .post_synthesis(&url, text, options, TTS_STREAM_TIMEOUT)
            .await?;

        Ok(response.bytes_stream().map(|chunk| {
            chunk.map_err(|e| VoiceError::Synthesis(format!("stream error: {}", e)))
        }))
    }

    /// Lists the voices available to the configured account.
    pub async fn voices(&self) -> Result<Vec<VoiceInfo>, VoiceError> {
        self.check_credential()?;

        let url = format!("{}/v1/voices", self.config.api_base);
        let response = self
            .http
            .get(&url)
            .header("xi-api-key", &self.config.api_key)
            .timeout(VOICES_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(VoiceError::Synthesis(format!(
                "failed to list voices: {}",
                response.status()
            )));
        }

        let parsed: VoicesResponse = response
            .json()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("failed to parse voices: {}", e)))?;

        Ok(parsed.voices)
    }

    async fn post_synthesis(
        &self,
        url: &str,
        text: &str,
        options: &SynthesisOptions,
        timeout: Duration,
    ) -> Result<reqwest::Response, VoiceError> {
        tracing::debug!(chars = text.chars().count(), "requesting synthesis");
        let response = self
            .http
            .post(url)
            .header("xi-api-key", &self.config.api_key)
            .header("Accept", "audio/mpeg")
            .json(&request_body(text, options, &self.config.model_id))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| VoiceError::Synthesis(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            // Surface the provider's error body verbatim.
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Synthesis(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        Ok(response)
    }

    fn check_input(&self, text: &str) -> Result<(), VoiceError> {
        self.check_credential()?;
        if text.len() > MAX_TTS_INPUT_BYTES {
            return Err(VoiceError::Synthesis(format!(
                "text exceeds maximum size: {} bytes (limit: {} bytes)",
                text.len(),
                MAX_TTS_INPUT_BYTES
            )));
        }
        Ok(())
    }

    fn check_credential(&self) -> Result<(), VoiceError> {
        if self.config.api_key.is_empty() {
            return Err(VoiceError::Config(
                "ELEVENLABS_API_KEY is not set".to_string(),
            ));
        }
        Ok(())
    }

    fn resolve_voice<'a>(&'a self, options: &'a SynthesisOptions) -> &'a str {
        options.voice_id.as_deref().unwrap_or(&self.config.voice_id)
    }
}

/// Builds the synthesis request body, applying the configured model
/// when the caller did not override it.
fn request_body(text: &str, options: &SynthesisOptions, default_model: &str) -> Value {
    json!({
        "text": text,
        "model_id": options.model_id.as_deref().unwrap_or(default_model),
        "voice_settings": {
            "stability": options.stability,
            "similarity_boost": options.similarity_boost,
        },
    })
}
