use thiserror::Error;

#[derive(Debug, Error)]
pub enum GptuberError {
    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid action source '{0}': expected 'streamer' or 'agent'")]
    InvalidSource(String),

    #[error("tokenizer failed: {0}")]
    Tokenizer(String),

    #[error("tokenizer not available: {0}")]
    TokenizerUnavailable(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GptuberError>;
