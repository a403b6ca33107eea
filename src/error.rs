use thiserror::Error;

/// Main error type for the hedging gym
#[derive(Error, Debug)]
pub enum GymError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    // Input contract errors
    #[error("Shape mismatch for {field}: expected {expected}, found {actual}")]
    ShapeMismatch {
        field: String,
        expected: String,
        actual: String,
    },

    #[error("Action bound violation: {0}")]
    BoundViolation(String),

    #[error("Missing feature: {0}")]
    MissingFeature(String),

    #[error("Policy contract violation: {0}")]
    Policy(String),

    // Numerical instability. Distinct from input-contract errors: the cause
    // is usually a training-dynamics problem (exploding state, mis-scaled
    // features), not a malformed input.
    #[error("Numerical error computing {field}: non-finite values detected")]
    NonFinite { field: String },

    // Lifecycle errors
    #[error("Invalid state: {0}")]
    InvalidState(String),

    // Checkpoint errors
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Generic errors
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

/// Result type alias for GymError
pub type Result<T> = std::result::Result<T, GymError>;
