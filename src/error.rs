//! Error types for banter.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BanterError {
    // Configuration errors
    #[error("Failed to parse configuration: {message}")]
    ConfigParse { message: String },

    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    // Audio track / clip errors
    #[error("Audio track error: {message}")]
    Track { message: String },

    #[error("Audio encoder tool not found: {tool}")]
    EncoderNotFound { tool: String },

    #[error("Audio encoding failed: {message}")]
    Encoder { message: String },

    // Playback errors
    #[error("Playback error: {message}")]
    Playback { message: String },

    #[error("Playback session already has a bound notification target")]
    AlreadyBound,

    #[error("Voice transport error: {message}")]
    Transport { message: String },

    // Transcription link errors
    #[error("Transcription socket error: {message}")]
    Socket { message: String },

    #[error("Transcription handshake failed: {message}")]
    Handshake { message: String },

    #[error("Transcription protocol error: {message}")]
    Protocol { message: String },

    #[error("Audio chunk outside the transmittable window: {message}")]
    InvalidChunk { message: String },

    // Conversation errors
    #[error("Chat backend needs a session refresh")]
    ChatSessionRefresh,

    #[error("Chat backend error: {message}")]
    Chat { message: String },

    #[error("Speech synthesis failed: {message}")]
    Synthesis { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, BanterError>;
