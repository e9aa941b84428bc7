//! Embedder trait, its error type, and vector utilities.
//!
//! The embedding model is an opaque capability: text in, fixed-dimension
//! `f32` vector out. Concrete implementations (the HTTP client) live in the
//! `wikirag` crate; tests substitute deterministic fakes.

use async_trait::async_trait;
use thiserror::Error;

/// Number of characters of the offending text kept in an [`EmbeddingError`].
pub const ERROR_PREFIX_CHARS: usize = 30;

/// Why an embedding call failed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EmbeddingErrorKind {
    /// Connection, TLS, or timeout failure before a status was received.
    #[error("transport error: {0}")]
    Transport(String),
    /// The service answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },
    /// 2xx response whose body is not the expected shape.
    #[error("malformed response: {0}")]
    Malformed(String),
}

/// A failed embedding call, tagged with a prefix of the text being embedded.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("embedding failed for \"{prefix}\": {kind}")]
pub struct EmbeddingError {
    pub prefix: String,
    pub kind: EmbeddingErrorKind,
}

impl EmbeddingError {
    pub fn new(text: &str, kind: EmbeddingErrorKind) -> Self {
        let mut prefix: String = text.chars().take(ERROR_PREFIX_CHARS).collect();
        if text.chars().nth(ERROR_PREFIX_CHARS).is_some() {
            prefix.push_str("...");
        }
        Self { prefix, kind }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// Transport failures, HTTP 429 and 5xx are transient. Other 4xx
    /// statuses and malformed bodies are permanent.
    pub fn is_transient(&self) -> bool {
        match &self.kind {
            EmbeddingErrorKind::Transport(_) => true,
            EmbeddingErrorKind::Status { status, .. } => *status == 429 || *status >= 500,
            EmbeddingErrorKind::Malformed(_) => false,
        }
    }
}

/// A text-to-vector embedding backend.
///
/// `embed` must return exactly one vector per input text, in input order.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Model identifier recorded in built archives (e.g. `"BAAI/bge-m3"`).
    fn model_name(&self) -> &str;

    /// Embed a batch of texts.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text.to_string()]).await?;
        match (vectors.pop(), vectors.is_empty()) {
            (Some(v), true) => Ok(v),
            (popped, _) => Err(EmbeddingError::new(
                text,
                EmbeddingErrorKind::Malformed(format!(
                    "expected 1 embedding, got {}",
                    vectors.len() + usize::from(popped.is_some())
                )),
            )),
        }
    }
}

/// Squared Euclidean distance between two vectors of equal length.
pub fn l2_squared(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Encode a float vector as little-endian `f32` bytes.
///
/// ```rust
/// use wikirag_core::embedding::{vec_to_blob, blob_to_vec};
///
/// let v = vec![1.0f32, -2.5, 3.125];
/// let blob = vec_to_blob(&v);
/// assert_eq!(blob.len(), 12);
/// assert_eq!(blob_to_vec(&blob), v);
/// ```
pub fn vec_to_blob(vec: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(vec.len() * 4);
    for &v in vec {
        bytes.extend_from_slice(&v.to_le_bytes());
    }
    bytes
}

/// Decode little-endian `f32` bytes. Trailing bytes short of a full value
/// are ignored.
pub fn blob_to_vec(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    struct FixedEmbedder {
        per_call: usize,
    }

    #[async_trait]
    impl Embedder for FixedEmbedder {
        fn model_name(&self) -> &str {
            "fixed"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            Ok(vec![vec![1.0, 2.0]; self.per_call])
        }
    }

    #[test]
    fn test_embed_one_single_vector() {
        let e = FixedEmbedder { per_call: 1 };
        assert_eq!(block_on(e.embed_one("q")).unwrap(), vec![1.0, 2.0]);
    }

    #[test]
    fn test_embed_one_wrong_count_is_malformed() {
        for n in [0, 2] {
            let e = FixedEmbedder { per_call: n };
            let err = block_on(e.embed_one("query text")).unwrap_err();
            assert!(matches!(err.kind, EmbeddingErrorKind::Malformed(_)));
            assert!(err.to_string().contains(&format!("got {}", n)));
        }
    }

    #[test]
    fn test_error_prefix_truncated() {
        let long = "x".repeat(100);
        let err = EmbeddingError::new(&long, EmbeddingErrorKind::Transport("reset".into()));
        assert_eq!(err.prefix, format!("{}...", "x".repeat(ERROR_PREFIX_CHARS)));

        let short = EmbeddingError::new("short", EmbeddingErrorKind::Transport("reset".into()));
        assert_eq!(short.prefix, "short");
    }

    #[test]
    fn test_transient_classification() {
        let status = |s| {
            EmbeddingError::new(
                "t",
                EmbeddingErrorKind::Status {
                    status: s,
                    body: String::new(),
                },
            )
        };
        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(!status(400).is_transient());
        assert!(!status(401).is_transient());
        let transport = EmbeddingError::new("t", EmbeddingErrorKind::Transport("eof".into()));
        assert!(transport.is_transient());
        let malformed = EmbeddingError::new("t", EmbeddingErrorKind::Malformed("no data".into()));
        assert!(!malformed.is_transient());
    }

    #[test]
    fn test_l2_squared() {
        assert_eq!(l2_squared(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
        assert_eq!(l2_squared(&[1.5, -2.0], &[1.5, -2.0]), 0.0);
    }

    #[test]
    fn test_vec_blob_roundtrip() {
        let vec = vec![1.0f32, -2.5, 3.125, 0.0, -0.001];
        assert_eq!(blob_to_vec(&vec_to_blob(&vec)), vec);
    }
}
