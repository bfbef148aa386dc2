use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ReconError {
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Config parse error: {0}")]
    ConfigParseError(#[from] toml::de::Error),
    #[error("Config error: {0}")]
    ConfigError(String),
    #[error("Schema error: {source_name} is missing required column '{column}'")]
    SchemaError { source_name: String, column: String },
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("Scenario '{scenario}' failed: {reason}")]
    ScenarioError { scenario: String, reason: String },
}

/// Maker-checker violations. Always audited before being returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GovernanceError {
    #[error("maker {maker_id} cannot approve their own ticket {ticket_id}")]
    SelfApproval { ticket_id: Uuid, maker_id: String },
    #[error("ticket {0} is already approved")]
    AlreadyApproved(Uuid),
}

/// Failure reported by a scoring dependency. Never escapes the circuit breaker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScoringError {
    #[error("scoring service unavailable: {0}")]
    Unavailable(String),
    #[error("invalid feature vector: {0}")]
    InvalidInput(String),
}

/// Failure delivering to a fire-and-forget sink (audit, retraining).
#[derive(Error, Debug)]
pub enum DeliveryError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("sink unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, ReconError>;
