use thiserror::Error;

#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ChatError {
    #[error("API configuration missing: {0}")]
    Configuration(String),

    /// Upstream answered with a non-success status; carries the server's message
    #[error("{0}")]
    Transport(String),

    #[error("Stream interrupted: {0}")]
    Stream(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    #[error("{0}")]
    Tool(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl From<config::ConfigError> for ChatError {
    fn from(err: config::ConfigError) -> Self {
        ChatError::Configuration(err.to_string())
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
