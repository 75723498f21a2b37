use thiserror::Error;

#[derive(Error, Debug)]
pub enum ToolbeltError {
    #[error("network request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("server responded with: {0}")]
    HttpStatus(String),

    #[error("invalid content checksum")]
    InvalidChecksum,

    #[error("content signature cannot be verified")]
    InvalidSignature,

    #[error("unsupported registry version: {0}")]
    UnsupportedRegistryVersion(u64),

    #[error("could not find tool '{0}' in the registry")]
    ToolNotFound(String),

    #[error("version {0} not found")]
    VersionNotFound(String),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ToolbeltError>;
