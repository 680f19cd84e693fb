use thiserror::Error;

/// Top-level error type for configuration and process I/O.
///
/// Scheduling errors stay typed in the engine crate; they are answered to
/// the caller through the bridge rather than bubbled up here.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ReveilleError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<toml::de::Error> for ReveilleError {
    fn from(err: toml::de::Error) -> Self {
        ReveilleError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for ReveilleError {
    fn from(err: toml::ser::Error) -> Self {
        ReveilleError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for ReveilleError {
    fn from(err: serde_json::Error) -> Self {
        ReveilleError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Reveille operations.
pub type Result<T> = std::result::Result<T, ReveilleError>;
