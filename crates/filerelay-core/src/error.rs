use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("input directory not found: {0}")]
    DirectoryNotFound(String),

    #[error("not a directory: {0}")]
    NotADirectory(String),

    #[error("config file not found: {0}")]
    ConfigNotFound(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid filename '{0}': must be a bare file name with no path separators")]
    InvalidFilename(String),

    #[error("corrupt processed-state store {path}: {reason}")]
    CorruptStore { path: String, reason: String },

    #[error("invalid status '{0}': expected 'success' or 'error'")]
    InvalidStatus(String),

    #[error("failed to build http client: {0}")]
    HttpClient(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
