use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoiceError {
    #[error("transcription error: {0}")]
    Transcription(String),

    #[error("generation error: {0}")]
    Generation(String),

    #[error("synthesis error: {0}")]
    Synthesis(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
