//! Embedding provider trait and vector utilities.
//!
//! Defines the [`Embedder`] trait that all embedding backends implement,
//! plus pure helpers for vector serialization and similarity.
//!
//! Concrete providers (OpenAI, Ollama) live in the `memory-harness` app
//! crate.

use async_trait::async_trait;

use crate::error::BackendError;

/// Converts text to fixed-dimension vectors.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;

    /// Dimensionality of every returned vector.
    fn dims(&self) -> usize;

    /// Embed a batch of texts, one vector per input in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, BackendError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors
            .pop()
            .ok_or_else(|| BackendError::Malformed("embedding response was empty".to_string()))
    }
}

/// Check that a batch response matches the request shape.
pub fn check_batch(
    vectors: &[Vec<f32>],
    expected_len: usize,
    dims: usize,
) -> Result<(), BackendError> {
    if vectors.len() != expected_len {
        return Err(BackendError::Malformed(format!(
            "expected {} vectors, got {}",
            expected_len,
            vectors.len()
        )));
    }
    if let Some(v) = vectors.iter().find(|v| v.len() != dims) {
        return Err(BackendError::Malformed(format!(
            "expected {} dimensions, got {}",
            dims,
            v.len()
        )));
    }
    Ok(())
}

/// Encode a float vector as a BLOB (little-endian f32 bytes).
///
/// # Example
///
/// ```rust
/// use memory_harness_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), Some(v));
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode a BLOB back into a float vector.
///
/// Returns `None` if the length is not a multiple of 4.
pub fn blob_to_vec(blob: &[u8]) -> Option<Vec<f32>> {
    if blob.len() % 4 != 0 {
        return None;
    }
    Some(
        blob.chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `0.0` for empty vectors or
/// vectors of different lengths.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < f32::EPSILON {
        return 0.0;
    }

    dot / denom
}

/// Format a vector as a pgvector literal: `[0.1,0.2,0.3]`.
pub fn to_pgvector_literal(vec: &[f32]) -> String {
    let parts: Vec<String> = vec.iter().map(|v| v.to_string()).collect();
    format!("[{}]", parts.join(","))
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedEmbedder;

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, BackendError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn test_embed_one_uses_batch() {
        let v = FixedEmbedder.embed_one("abc").await.unwrap();
        assert_eq!(v, vec![3.0, 1.0]);
    }

    #[test]
    fn test_blob_rejects_ragged_length() {
        assert_eq!(blob_to_vec(&[0, 0, 0]), None);
        assert_eq!(blob_to_vec(&[]), Some(Vec::new()));
    }

    #[test]
    fn test_check_batch() {
        let ok = vec![vec![0.0; 3], vec![1.0; 3]];
        assert!(check_batch(&ok, 2, 3).is_ok());
        assert!(matches!(
            check_batch(&ok, 3, 3),
            Err(BackendError::Malformed(_))
        ));
        assert!(matches!(
            check_batch(&ok, 2, 4),
            Err(BackendError::Malformed(_))
        ));
    }

    #[test]
    fn test_cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn test_cosine_different_lengths() {
        assert_eq!(cosine_similarity(&[1.0, 2.0], &[1.0]), 0.0);
    }

    #[test]
    fn test_pgvector_literal() {
        assert_eq!(to_pgvector_literal(&[1.0, -0.5, 2.25]), "[1,-0.5,2.25]");
        assert_eq!(to_pgvector_literal(&[]), "[]");
    }
}
