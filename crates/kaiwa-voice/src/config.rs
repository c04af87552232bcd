use serde::{Deserialize, Serialize};
use std::fmt;

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o".to_string()
}

fn default_stt_model() -> String {
    "whisper-1".to_string()
}

fn default_language() -> String {
    "ja".to_string()
}

/// Configuration for the OpenAI-backed adapters (transcription and
/// reply generation).
#[derive(Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(skip_serializing, default)]
    pub api_key: String,
    /// Base URL of the OpenAI-compatible API. Overridable for tests.
    #[serde(default = "default_openai_api_base")]
    pub api_base: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_stt_model")]
    pub stt_model: String,
    /// Fixed language hint for transcription (not auto-detected).
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_openai_api_base(),
            chat_model: default_chat_model(),
            stt_model: default_stt_model(),
            language: default_language(),
        }
    }
}

impl fmt::Debug for OpenAiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("chat_model", &self.chat_model)
            .field("stt_model", &self.stt_model)
            .field("language", &self.language)
            .finish()
    }
}

fn default_elevenlabs_api_base() -> String {
    "https://api.elevenlabs.io".to_string()
}

fn default_voice_id() -> String {
    // Rachel — calm female voice, the provider's stock default.
    "21m00Tcm4TlvDq8ikWAM".to_string()
}

fn default_tts_model() -> String {
    "eleven_multilingual_v2".to_string()
}

/// Configuration for the ElevenLabs synthesis adapter.
#[derive(Clone, Serialize, Deserialize)]
pub struct ElevenLabsConfig {
    #[serde(skip_serializing, default)]
    pub api_key: String,
    /// Base URL of the ElevenLabs API. Overridable for tests.
    #[serde(default = "default_elevenlabs_api_base")]
    pub api_base: String,
    #[serde(default = "default_voice_id")]
    pub voice_id: String,
    #[serde(default = "default_tts_model")]
    pub model_id: String,
}

impl Default for ElevenLabsConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            api_base: default_elevenlabs_api_base(),
            voice_id: default_voice_id(),
            model_id: default_tts_model(),
        }
    }
}

impl fmt::Debug for ElevenLabsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ElevenLabsConfig")
            .field("api_key", &"[REDACTED]")
            .field("api_base", &self.api_base)
            .field("voice_id", &self.voice_id)
            .field("model_id", &self.model_id)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openai_debug_redacts_api_key() {
        let config = OpenAiConfig {
            api_key: "sk-secret".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn elevenlabs_debug_redacts_api_key() {
        let config = ElevenLabsConfig {
            api_key: "el-secret".to_string(),
            ..Default::default()
        };
        let debug = format!("{:?}", config);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("el-secret"));
    }

    #[test]
    fn openai_defaults_fill_missing_fields() {
        let config: OpenAiConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.api_base, "https://api.openai.com/v1");
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.stt_model, "whisper-1");
        assert_eq!(config.language, "ja");
    }

    #[test]
    fn elevenlabs_serialize_omits_api_key() {
        let config = ElevenLabsConfig {
            api_key: "el-secret".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_value(&config).unwrap();
        assert!(json.get("api_key").is_none());
        assert_eq!(json["voice_id"], "21m00Tcm4TlvDq8ikWAM");
    }
}
