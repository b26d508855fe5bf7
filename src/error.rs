use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExporterError {
    #[error("Bitbucket API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Unexpected response format: {0}")]
    Schema(#[source] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Metrics registry error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ExporterError>;
