//! Error types for the policy agent
//!
//! One enum for every failure the agent surfaces, with the HTTP status an
//! outer transport would map it to.

/// Main error type for policy agent operations
#[derive(Debug, thiserror::Error)]
pub enum PolicyAgentError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Registry unavailable: {0}")]
    RegistryUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Peer unreachable: {0}")]
    PeerUnreachable(String),

    #[error("Peer rejected: {0}")]
    PeerRejected(String),

    #[error("Already resolved: {0}")]
    AlreadyResolved(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PolicyAgentError {
    /// HTTP status code an outer transport should answer with
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Configuration(_) => 500,
            Self::Encoding(_) => 500,
            Self::RegistryUnavailable(_) => 502,
            Self::NotFound(_) => 404,
            Self::Store(_) => 503,
            Self::PeerUnreachable(_) => 502,
            Self::PeerRejected(_) => 502,
            Self::AlreadyResolved(_) => 409,
            Self::BadRequest(_) => 400,
            Self::Internal(_) => 500,
        }
    }
}

impl From<serde_json::Error> for PolicyAgentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Encoding(format!("JSON error: {}", err))
    }
}

impl From<mongodb::error::Error> for PolicyAgentError {
    fn from(err: mongodb::error::Error) -> Self {
        Self::Store(err.to_string())
    }
}

impl From<bson::de::Error> for PolicyAgentError {
    fn from(err: bson::de::Error) -> Self {
        Self::Store(format!("BSON decode error: {}", err))
    }
}

impl From<bson::ser::Error> for PolicyAgentError {
    fn from(err: bson::ser::Error) -> Self {
        Self::Store(format!("BSON encode error: {}", err))
    }
}

impl From<reqwest::Error> for PolicyAgentError {
    fn from(err: reqwest::Error) -> Self {
        Self::RegistryUnavailable(err.to_string())
    }
}

/// Result type alias for policy agent operations
pub type Result<T> = std::result::Result<T, PolicyAgentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        assert_eq!(PolicyAgentError::NotFound("x".into()).status_code(), 404);
        assert_eq!(PolicyAgentError::AlreadyResolved("x".into()).status_code(), 409);
        assert_eq!(PolicyAgentError::BadRequest("x".into()).status_code(), 400);
        assert_eq!(PolicyAgentError::Store("x".into()).status_code(), 503);
    }

    #[test]
    fn test_display_includes_context() {
        let err = PolicyAgentError::PeerRejected("could not decode ACK/NACK: <html>".into());
        assert_eq!(err.status_code(), 502);
        assert_eq!(err.to_string(), "Peer rejected: could not decode ACK/NACK: <html>");
    }
}
