use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HomeAgentError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Process error: {0}")]
    Process(String),

    #[error("agent did not finish within {}s and was killed", .0.as_secs())]
    Timeout(Duration),
}
