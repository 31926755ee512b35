//! Error types for Prahari

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Prahari error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed MLLP block framing
    #[error("Framing error: {0}")]
    Framing(String),

    /// Missing or malformed HL7 field
    #[error("Parse error: {0}")]
    Parse(String),

    /// Lab result arrived for a patient with no recorded admission
    #[error("No demographics on record for patient {0}")]
    MissingDemographics(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// Snapshot or model artifact (de)serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Model artifact or inference failure
    #[error("Model error: {0}")]
    Model(String),

    /// Feed unreachable after exhausting the reconnect budget
    #[error("Feed unreachable after {attempts} reconnect attempts")]
    FeedExhausted {
        /// Connect attempts made over the process lifetime
        attempts: u32,
    },

    /// Generic error with message
    #[error("{0}")]
    Other(String),
}
