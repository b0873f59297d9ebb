//! Error types for the Treehole client core

use thiserror::Error;

/// Fallback shown when the service gives no usable error message
pub const SERVICE_UNAVAILABLE: &str = "service unavailable";

/// Shown when the transport itself fails before any response arrives
pub const NETWORK_UNAVAILABLE: &str = "network error, please try again later";

/// Main error type for Treehole client operations
#[derive(Debug, Error)]
pub enum TreeholeError {
    /// Identity does not match a recognized identifier shape.
    /// Raised locally, before any request is sent.
    #[error("Identity invalid, please sign in again")]
    IdentityInvalid,

    /// Non-2xx status or an error-shaped response body
    #[error("Request failed: {0}")]
    RequestFailed(String),

    /// Successful status but nothing to stream
    #[error("Empty stream: {}", SERVICE_UNAVAILABLE)]
    EmptyStream,

    /// Transport failure after streaming started
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    /// Emotion analysis could not produce a result
    #[error("Emotion analysis unavailable")]
    EmotionUnavailable,

    /// Voice synthesis or upload error
    #[error("Voice error: {0}")]
    Voice(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Timeout error
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Convenient Result type using TreeholeError
pub type Result<T> = std::result::Result<T, TreeholeError>;

impl TreeholeError {
    /// Create a request failure
    pub fn request_failed(msg: impl Into<String>) -> Self {
        TreeholeError::RequestFailed(msg.into())
    }

    /// Create a stream interruption
    pub fn stream_interrupted(msg: impl Into<String>) -> Self {
        TreeholeError::StreamInterrupted(msg.into())
    }

    /// Create a voice error
    pub fn voice(msg: impl Into<String>) -> Self {
        TreeholeError::Voice(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        TreeholeError::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        TreeholeError::Validation(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        TreeholeError::Timeout(msg.into())
    }

    /// Create a generic error
    pub fn other(msg: impl Into<String>) -> Self {
        TreeholeError::Other(msg.into())
    }

    /// Short message suitable for a transient notice in a UI.
    ///
    /// Transport errors never leak their internals here.
    pub fn user_notice(&self) -> String {
        match self {
            TreeholeError::IdentityInvalid => "Identity invalid, please sign in again".to_string(),
            TreeholeError::RequestFailed(msg) => msg.clone(),
            TreeholeError::EmptyStream => SERVICE_UNAVAILABLE.to_string(),
            TreeholeError::StreamInterrupted(_) => {
                "Connection lost, please try again later".to_string()
            }
            TreeholeError::EmotionUnavailable => "Emotion analysis unavailable".to_string(),
            TreeholeError::Network(_) => NETWORK_UNAVAILABLE.to_string(),
            TreeholeError::Voice(msg)
            | TreeholeError::Timeout(msg)
            | TreeholeError::Validation(msg) => msg.clone(),
            other => other.to_string(),
        }
    }
}
