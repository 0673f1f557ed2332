use thiserror::Error;

/// Errors raised while encoding, decoding or comparing embeddings.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EmbeddingError {
    #[error("embedding dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },
    #[error("malformed embedding buffer: {len} bytes is not a positive multiple of 4")]
    MalformedEmbedding { len: usize },
    #[error("malformed embedding: component {index} is NaN or infinite")]
    NonFiniteComponent { index: usize },
    #[error("embedding is degenerate (zero norm)")]
    DegenerateEmbedding,
}

impl EmbeddingError {
    /// Whether the error describes an unreadable buffer rather than a caller mistake.
    ///
    /// Bulk matching skips entries for which this is true.
    pub fn is_malformed(&self) -> bool {
        matches!(
            self,
            EmbeddingError::MalformedEmbedding { .. } | EmbeddingError::NonFiniteComponent { .. }
        )
    }
}
