use thiserror::Error;

pub type FinderResult<T> = Result<T, FinderError>;

#[derive(Debug, Error)]
pub enum FinderError {
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Failed to create HTTP client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("Invalid value for header {name}: {reason}")]
    InvalidHeader { name: &'static str, reason: String },
}

impl From<config::ConfigError> for FinderError {
    fn from(e: config::ConfigError) -> Self {
        FinderError::Configuration(e.to_string())
    }
}

/// Failure reported by a binary payload decoder.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Malformed payload: {0}")]
    Malformed(String),
}
