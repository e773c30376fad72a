//! Error types for the IDMS assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur inside the assistant
///
/// None of these escape the response pipeline: the engine, synthesizer and
/// listener catch them at the call site and degrade to a fallback.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or codec error
    #[error("audio error: {0}")]
    Audio(String),

    /// Microphone produced no speech before the wait timeout
    #[error("timed out: {0}")]
    Timeout(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Chat completion error
    #[error("chat error: {0}")]
    Chat(String),

    /// Language detection error
    #[error("language detection error: {0}")]
    Language(String),

    /// Talking-head generation or playback error
    #[error("avatar error: {0}")]
    Avatar(String),

    /// Looping video error
    #[error("video error: {0}")]
    Video(String),

    /// Image display error
    #[error("display error: {0}")]
    Display(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
