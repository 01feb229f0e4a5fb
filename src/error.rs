/// All errors the scoring and reconciliation engine can surface.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    /// Malformed input, rejected before any state changed.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation precondition does not hold; nothing changed.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A chunked batch failed partway through. Chunks `0..committed` are
    /// durable, the rest were not attempted. The whole operation can be
    /// retried: already-applied work re-derives to zero deltas.
    #[error("batch commit failed after {committed} of {total} chunks: {source}")]
    PartialCommit {
        committed: usize,
        total: usize,
        source: sqlx::Error,
    },

    /// Any other store failure.
    #[error("store error: {0}")]
    Store(#[from] sqlx::Error),

    /// A stored JSON column could not be decoded.
    #[error("corrupt stored record: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// A stored timestamp column could not be parsed.
    #[error("corrupt stored timestamp: {0}")]
    Timestamp(#[from] chrono::ParseError),
}

impl EngineError {
    /// Whether the caller should retry the whole top-level operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::PartialCommit { .. } | EngineError::Store(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
