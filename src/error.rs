//! Error types for the outbound send engine.

use std::time::Duration;

use uuid::Uuid;

/// Top-level error type for the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Content generation error: {0}")]
    Generate(#[from] GenerateError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Configuration-related errors.
///
/// Raised while loading `EngineConfig` these abort startup; raised during a
/// dispatch pass (unknown strategy key, missing credentials) they skip the
/// affected campaign or mailbox only.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unknown strategy key: {key}")]
    UnknownStrategy { key: String },

    #[error("No SMTP credentials configured for mailbox {address}")]
    MissingCredentials { address: String },

    #[error("Warm-up schedule must be non-decreasing: stage {stage} maps to {limit}, below stage {prev_stage}'s {prev_limit}")]
    NonMonotonicWarmup {
        stage: u8,
        limit: u32,
        prev_stage: u8,
        prev_limit: u32,
    },
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to open store: {0}")]
    Open(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Entity not found: {entity} with id {id}")]
    NotFound { entity: String, id: Uuid },

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Content generation errors.
#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("Model request failed: {reason}")]
    RequestFailed { reason: String },

    #[error("Model rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Option<Duration> },

    #[error("Malformed model output: {reason}")]
    MalformedOutput { reason: String },
}

impl GenerateError {
    /// Whether a retry could plausibly succeed. Malformed output never
    /// retries.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RequestFailed { .. } | Self::RateLimited { .. })
    }
}

/// SMTP transport errors.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Invalid address: {0}")]
    Address(String),

    #[error("Failed to build message: {0}")]
    Compose(String),

    #[error("SMTP authentication failed for {mailbox}")]
    Auth { mailbox: String },

    #[error("SMTP connection failed: {0}")]
    Connect(String),

    #[error("Recipient rejected: {0}")]
    Rejected(String),

    #[error("Transient SMTP failure: {0}")]
    Transient(String),
}

impl TransportError {
    /// Whether the harness should retry this error.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Connect(_) | Self::Transient(_))
    }

    /// Whether the failure is attributable to the sending mailbox.
    ///
    /// Recipient-side rejections say nothing about our sender identity;
    /// auth/connect/busy failures do.
    pub fn is_mailbox_fault(&self) -> bool {
        matches!(
            self,
            Self::Auth { .. } | Self::Connect(_) | Self::Transient(_)
        )
    }
}

/// Result type alias for the engine.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generate_error_classification() {
        assert!(
            GenerateError::RequestFailed {
                reason: "502".into()
            }
            .is_transient()
        );
        assert!(GenerateError::RateLimited { retry_after: None }.is_transient());
        assert!(
            !GenerateError::MalformedOutput {
                reason: "missing subject".into()
            }
            .is_transient()
        );
    }

    #[test]
    fn transport_error_classification() {
        assert!(TransportError::Connect("refused".into()).is_transient());
        assert!(TransportError::Transient("421".into()).is_transient());
        assert!(
            !TransportError::Auth {
                mailbox: "a@b.c".into()
            }
            .is_transient()
        );
        assert!(!TransportError::Rejected("550".into()).is_transient());
    }

    #[test]
    fn recipient_rejection_is_not_a_mailbox_fault() {
        assert!(!TransportError::Rejected("550 unknown user".into()).is_mailbox_fault());
        assert!(
            TransportError::Auth {
                mailbox: "a@b.c".into()
            }
            .is_mailbox_fault()
        );
        assert!(TransportError::Connect("timed out".into()).is_mailbox_fault());
    }
}
