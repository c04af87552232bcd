use crate::config::OpenAiConfig;
use crate::error::VoiceError;
use serde::Deserialize;
use std::time::Duration;

/// Maximum audio input size for transcription (25 MiB, the provider's
/// own upload ceiling). Rejected locally to avoid a pointless round trip.
const MAX_STT_INPUT_BYTES: usize = 25 * 1024 * 1024;

/// Timeout for a transcription request.
const STT_TIMEOUT: Duration = Duration::from_secs(60);

/// Fallback upload filename when the client did not supply one. The
/// provider infers the container format from the extension.
const DEFAULT_FILENAME: &str = "audio.m4a";

/// One timed segment of a detailed transcription.
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionSegment {
    pub id: i64,
    pub start: f64,
    pub end: f64,
    pub text: String,
}

/// Transcription result with diagnostic detail (`verbose_json` format).
#[derive(Debug, Clone, Deserialize)]
pub struct TranscriptionDetails {
    pub text: String,
    pub language: String,
    pub duration: f64,
    #[serde(default)]
    pub segments: Vec<TranscriptionSegment>,
}

/// Speech-to-text adapter backed by the OpenAI Whisper API.
#[derive(Debug, Clone)]
pub struct SttClient {
    http: reqwest::Client,
    config: OpenAiConfig,
}

impl SttClient {
    pub fn new(config: OpenAiConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    /// Transcribes an audio blob to text.
    ///
    /// The language hint is fixed from configuration rather than
    /// auto-detected. Output is trimmed of surrounding whitespace.
    pub async fn transcribe(
        &self,
        audio: &[u8],
        filename: Option<&str>,
    ) -> Result<String, VoiceError> {
        let response = self
            .request(audio, filename, "text")
            .await?
            .text()
            .await
            .map_err(|e| VoiceError::Transcription(format!("failed to read response: {}", e)))?;

        Ok(response.trim().to_string())
    }

    /// Transcribes an audio blob and returns detected language, duration,
    /// and segment timing. Diagnostics entry point; the main pipeline path
    /// uses [`SttClient::transcribe`].
    pub async fn transcribe_detailed(
        &self,
        audio: &[u8],
        filename: Option<&str>,
    ) -> Result<TranscriptionDetails, VoiceError> {
        self.request(audio, filename, "verbose_json")
            .await?
            .json::<TranscriptionDetails>()
            .await
            .map_err(|e| VoiceError::Transcription(format!("failed to parse response: {}", e)))
    }

    async fn request(
        &self,
        audio: &[u8],
        filename: Option<&str>,
        response_format: &str,
    ) -> Result<reqwest::Response, VoiceError> {
        if audio.is_empty() {
            return Err(VoiceError::Transcription("audio data is empty".to_string()));
        }
        if audio.len() > MAX_STT_INPUT_BYTES {
            return Err(VoiceError::Transcription(format!(
                "audio data exceeds maximum size: {} bytes (limit: {} bytes)",
                audio.len(),
                MAX_STT_INPUT_BYTES
            )));
        }

        let filename = effective_filename(filename);
        let part = reqwest::multipart::Part::bytes(audio.to_vec())
            .file_name(filename)
            .mime_str("application/octet-stream")
            .map_err(|e| VoiceError::Transcription(format!("invalid upload part: {}", e)))?;

        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("model", self.config.stt_model.clone())
            .text("language", self.config.language.clone())
            .text("response_format", response_format.to_string());

        let url = format!("{}/audio/transcriptions", self.config.api_base);
        tracing::debug!(bytes = audio.len(), format = response_format, "requesting transcription");
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .multipart(form)
            .timeout(STT_TIMEOUT)
            .send()
            .await
            .map_err(|e| VoiceError::Transcription(format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(VoiceError::Transcription(format!(
                "provider returned {}: {}",
                status, detail
            )));
        }

        Ok(response)
    }
}

/// Normalizes the upload filename, falling back to a generic extension
/// when the client did not supply one.
fn effective_filename(filename: Option<&str>) -> String {
    match filename {
        Some(name) if !name.trim().is_empty() => name.to_string(),
        _ => DEFAULT_FILENAME.to_string(),
    }
}
