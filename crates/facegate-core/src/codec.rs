//! Embedding normalization and the fixed-width storage encoding.
//!
//! The byte layout is one little-endian IEEE-754 `f32` per component, no
//! header. The buffer length alone determines the dimension on read.

use crate::error::EmbeddingError;
use crate::types::{l2_norm, Embedding, Form};

const COMPONENT_BYTES: usize = 4;

/// Scale a raw vector to unit L2 norm.
///
/// A zero or non-finite norm leaves the values untouched and marks the
/// result [`Form::Degenerate`], which the matcher never promotes to a match.
pub fn normalize(raw: Vec<f32>) -> Embedding {
    let norm = l2_norm(&raw);
    if !norm.is_finite() || norm == 0.0 {
        tracing::warn!(dimension = raw.len(), "degenerate embedding, not normalized");
        return Embedding::with_form(raw, Form::Degenerate);
    }

    let values = raw
        .into_iter()
        .map(|v| (f64::from(v) / norm) as f32)
        .collect();
    Embedding::with_form(values, Form::Unit)
}

pub fn serialize(embedding: &Embedding) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.dimension() * COMPONENT_BYTES);
    for &v in embedding.values() {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a stored buffer of any dimension.
pub fn deserialize(bytes: &[u8]) -> Result<Embedding, EmbeddingError> {
    if bytes.is_empty() || bytes.len() % COMPONENT_BYTES != 0 {
        return Err(EmbeddingError::MalformedEmbedding { len: bytes.len() });
    }

    let mut values = Vec::with_capacity(bytes.len() / COMPONENT_BYTES);
    for (index, chunk) in bytes.chunks_exact(COMPONENT_BYTES).enumerate() {
        let arr: [u8; COMPONENT_BYTES] = chunk
            .try_into()
            .map_err(|_| EmbeddingError::MalformedEmbedding { len: bytes.len() })?;
        let v = f32::from_le_bytes(arr);
        if !v.is_finite() {
            return Err(EmbeddingError::NonFiniteComponent { index });
        }
        values.push(v);
    }

    Ok(Embedding::new(values))
}

/// Decode a buffer that must have exactly `dimension` components.
pub fn deserialize_with_dimension(
    bytes: &[u8],
    dimension: usize,
) -> Result<Embedding, EmbeddingError> {
    let embedding = deserialize(bytes)?;
    if embedding.dimension() != dimension {
        return Err(EmbeddingError::DimensionMismatch {
            expected: dimension,
            found: embedding.dimension(),
        });
    }
    Ok(embedding)
}
