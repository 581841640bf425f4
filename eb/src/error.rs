//! Bridge error types

use thiserror::Error;

use crate::domain::StreamKey;

/// Errors surfaced to one-shot bridge calls
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The ECU index or record cannot drive the requested operation
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The engine returned no stream for the operation
    #[error("Stream unavailable: {0}")]
    StreamUnavailable(StreamKey),

    /// No diagnostic engine is attached
    #[error("No diagnostic engine attached")]
    EngineUnavailable,

    /// The transport could not be brought up
    #[error("Transport error: {0}")]
    Transport(String),

    /// The supervisor lane is gone
    #[error("Supervisor lane closed")]
    LaneClosed,
}

impl BridgeError {
    /// Check if the caller is expected to retry
    pub fn is_retryable(&self) -> bool {
        matches!(self, BridgeError::StreamUnavailable(_) | BridgeError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        assert!(BridgeError::StreamUnavailable(StreamKey::EeDump).is_retryable());
        assert!(BridgeError::Transport("socket closed".to_string()).is_retryable());
        assert!(!BridgeError::Configuration("bad index".to_string()).is_retryable());
        assert!(!BridgeError::LaneClosed.is_retryable());
    }

    #[test]
    fn test_display_names_stream() {
        let err = BridgeError::StreamUnavailable(StreamKey::UpdateFlash);
        assert_eq!(err.to_string(), "Stream unavailable: updateFlash");
    }
}
