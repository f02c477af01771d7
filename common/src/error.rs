use async_openai::error::OpenAIError;
use serde::Serialize;
use thiserror::Error;

/// Error kind taxonomy from the public API's error envelope (`{error: {code, ...}}`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    BackendUnavailable,
    ProviderFailure,
    Transient,
    CorruptArtifact,
    Fatal,
}

impl ErrorKind {
    pub fn status_code(self) -> u16 {
        match self {
            ErrorKind::Validation => 400,
            ErrorKind::NotFound => 404,
            ErrorKind::Conflict => 409,
            ErrorKind::BackendUnavailable => 200, // degraded, not refused
            ErrorKind::ProviderFailure => 200,
            ErrorKind::Transient => 503,
            ErrorKind::CorruptArtifact => 422,
            ErrorKind::Fatal => 500,
        }
    }
}

#[derive(Error, Debug)]
pub enum GraphRagError {
    #[error("storage error: {0}")]
    Storage(#[from] surrealdb::Error),
    #[error("llm provider error: {0}")]
    Provider(#[from] OpenAIError),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("lock contention: {0}")]
    Conflict(String),
    #[error("graph backend unavailable, used fallback: {0}")]
    BackendUnavailable(String),
    #[error("provider failure: {0}")]
    ProviderFailure(String),
    #[error("transient failure: {0}")]
    Transient(String),
    #[error("corrupt artifact: {0}")]
    CorruptArtifact(String),
    #[error("fatal storage integrity violation: {0}")]
    Fatal(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl GraphRagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            GraphRagError::Validation(_) => ErrorKind::Validation,
            GraphRagError::NotFound(_) => ErrorKind::NotFound,
            GraphRagError::Conflict(_) => ErrorKind::Conflict,
            GraphRagError::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            GraphRagError::ProviderFailure(_) | GraphRagError::Provider(_) => {
                ErrorKind::ProviderFailure
            }
            GraphRagError::Transient(_) => ErrorKind::Transient,
            GraphRagError::CorruptArtifact(_) => ErrorKind::CorruptArtifact,
            GraphRagError::Fatal(_) => ErrorKind::Fatal,
            GraphRagError::Storage(_) | GraphRagError::Io(_) | GraphRagError::Serde(_) => {
                ErrorKind::Fatal
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphRagError>;
