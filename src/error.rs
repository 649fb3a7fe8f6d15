//! Error types for the ingestion pipeline.

use std::path::PathBuf;

/// Errors that can occur while syncing, filtering, chunking, or submitting
/// a repository to the vector index.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Invalid or conflicting configuration, detected before any I/O.
    #[error("configuration error: {0}")]
    Config(String),

    /// A network operation required an access token and none was configured.
    #[error("an access token is required to {0}")]
    Credential(String),

    /// `pull` was requested but no local snapshot exists yet.
    #[error("repository not found at {0}")]
    RepositoryMissing(PathBuf),

    /// The requested batch size is outside the store's per-request limit.
    #[error("batch size {requested} exceeds the per-request limit of {limit}")]
    BatchSize { requested: usize, limit: usize },

    /// IO error reading the local snapshot or writing audit logs.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP transport error talking to the hosting API or the vector store.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The vector store rejected a request.
    #[error("vector store error: {0}")]
    Store(String),
}

/// Result type alias using [`PipelineError`].
pub type Result<T> = std::result::Result<T, PipelineError>;
