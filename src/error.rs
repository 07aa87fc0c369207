//! Error types for live calls

use thiserror::Error;

/// Result type alias for live call operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during a live call
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Camera or microphone unavailable or permission denied
    #[error("device acquisition failed: {0}")]
    DeviceAcquisition(String),

    /// Remote channel reported an error
    #[error("channel error: {0}")]
    Channel(String),

    /// Inbound media frame could not be decoded
    #[error("malformed frame: {0}")]
    MalformedFrame(String),

    /// Audio device error after acquisition
    #[error("audio error: {0}")]
    Audio(String),

    /// Video sampling or compression error
    #[error("video error: {0}")]
    Video(String),

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

