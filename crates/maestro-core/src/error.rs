use std::path::PathBuf;
use thiserror::Error;

pub type MaestroResult<T> = Result<T, MaestroError>;

#[derive(Error, Debug)]
pub enum MaestroError {
    #[error("unsupported API version: {0}")]
    UnsupportedApiVersion(String),

    #[error("unknown resource kind: {0}")]
    UnknownKind(String),

    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),

    #[error("invalid spec: {0}")]
    InvalidSpec(String),

    #[error("failed to resolve {kind} \"{name}\": {cause}")]
    ResourceResolution {
        name: String,
        kind: String,
        cause: String,
    },

    #[error("queue is full")]
    QueueFull,

    #[error("task queue is stopped")]
    QueueClosed,

    #[error("runner script not found at {}", .0.display())]
    RunnerMissing(PathBuf),

    #[error("runner error: {0}")]
    Runtime(String),

    #[error("runner exited with error: {0}")]
    RuntimeExit(String),

    #[error("unsupported LLM provider: {0} (provide base_url for OpenAI-compatible APIs)")]
    UnsupportedProvider(String),

    #[error("API key not configured for provider: {0}")]
    MissingApiKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
