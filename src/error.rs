use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while building or running the pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be read
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("failed to parse configuration file: {0}")]
    Parse(#[from] serde_json::Error),

    /// Worker thread spawn or join failure
    #[error("thread error: {0}")]
    Thread(String),
}
