use thiserror::Error;

/// Errors from repository operations (used by trait definitions in smartflow-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("I/O error: {0}")]
    Io(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for RepositoryError {
    fn from(err: std::io::Error) -> Self {
        RepositoryError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// Errors raised while rendering `{name}` prompt templates.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("missing template variable '{0}'")]
    MissingVariable(String),

    #[error("unterminated placeholder at byte {0}")]
    Unterminated(usize),

    #[error("unmatched '}}' at byte {0}")]
    UnmatchedClose(usize),
}

/// Errors raised by transform (non-LLM) substeps.
#[derive(Debug, Clone, Error)]
pub enum TransformError {
    #[error("unknown transform '{0}'")]
    Unknown(String),

    #[error("invalid transform input: {0}")]
    InvalidInput(String),

    #[error("transform failed: {0}")]
    Failed(String),
}

/// Errors from retrieval index construction and search.
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("chunking failed: {0}")]
    Chunking(String),
}
