//! Error types for TenderMesh

use thiserror::Error;

/// Main error type for TenderMesh
#[derive(Error, Debug)]
pub enum TenderMeshError {
    // Configuration errors
    #[error("Configuration unreadable: {0}")]
    ConfigUnreadable(String),

    #[error("Invalid configuration value for '{key}': {value}")]
    InvalidConfig { key: String, value: String },

    // Data model errors
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    #[error("Invalid bid: {0}")]
    InvalidBid(String),

    #[error("Invalid proposal: {0}")]
    InvalidProposal(String),

    // Messaging errors
    #[error("Message routing error: {0}")]
    MessageRouting(String),

    #[error("Mailbox closed for {0}")]
    MailboxClosed(String),

    #[error("Unreadable message content: {0}")]
    UnreadableContent(String),

    // Negotiation errors
    #[error("Negotiation session failed: {0}")]
    SessionFailed(String),

    #[error("Negotiation timeout: {0}")]
    NegotiationTimeout(String),

    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    // General errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for TenderMesh operations
pub type Result<T> = std::result::Result<T, TenderMeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = TenderMeshError::InvalidBundle("empty item list".to_string());
        assert_eq!(err.to_string(), "Invalid bundle: empty item list");
    }

    #[test]
    fn test_invalid_config_error() {
        let err = TenderMeshError::InvalidConfig {
            key: "buyer.riskBeta".to_string(),
            value: "abc".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid configuration value for 'buyer.riskBeta': abc"
        );
    }

    #[test]
    fn test_error_conversion() {
        fn io_error_function() -> Result<()> {
            std::fs::read_to_string("/nonexistent/file")?;
            Ok(())
        }

        let result = io_error_function();
        assert!(matches!(result.unwrap_err(), TenderMeshError::Io(_)));
    }
}
