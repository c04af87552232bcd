//! Remote voice-provider adapters for the Kaiwa relay.
//!
//! Wraps three external services behind plain async calls: OpenAI
//! Whisper for speech-to-text, OpenAI chat completions for reply
//! generation, and ElevenLabs for speech synthesis. Each adapter is a
//! stateless function of its inputs plus read-only configuration;
//! provider failures surface as [`VoiceError`] variants carrying the
//! remote detail verbatim.

pub mod config;
pub mod error;
pub mod llm;
pub mod stt;
pub mod tts;

pub use config::{ElevenLabsConfig, OpenAiConfig};
pub use error::VoiceError;
pub use llm::{ChatClient, ChatMessage, DEFAULT_SYSTEM_PROMPT};
pub use stt::{SttClient, TranscriptionDetails, TranscriptionSegment};
pub use tts::{SynthesisOptions, TtsClient, VoiceInfo};
