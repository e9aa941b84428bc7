//! Error taxonomy of the retrieval core.
//!
//! Every failure reaching a caller of [`crate::retrieval`] is a [`RagError`].
//! Build and query entry points wrap their root cause in
//! [`RagError::BuildFailure`] / [`RagError::QueryFailure`]; the boxed inner
//! error stays matchable.

use std::path::PathBuf;

use thiserror::Error;
use wikirag_core::chunk::ChunkingError;
use wikirag_core::embedding::EmbeddingError;
use wikirag_core::index::IndexError;

#[derive(Debug, Error)]
pub enum RagError {
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error("dimension mismatch: expected {expected}-d vectors, got {actual}-d")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("archive {} is corrupt: {reason}", path.display())]
    ArchiveCorrupt { path: PathBuf, reason: String },

    #[error("build failed: {0}")]
    BuildFailure(#[source] Box<RagError>),

    #[error("query failed: {0}")]
    QueryFailure(#[source] Box<RagError>),

    #[error("no slices to embed: every document under {} is empty", .0.display())]
    EmptyCorpus(PathBuf),

    #[error("invalid document {}: {reason}", path.display())]
    InvalidDocument { path: PathBuf, reason: String },

    #[error("vector index error: {0}")]
    Index(#[source] IndexError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, RagError>;

impl From<IndexError> for RagError {
    fn from(err: IndexError) -> Self {
        match err {
            IndexError::DimensionMismatch { expected, actual } => {
                RagError::DimensionMismatch { expected, actual }
            }
            other => RagError::Index(other),
        }
    }
}

impl RagError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        RagError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        RagError::ArchiveCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn build(self) -> Self {
        match self {
            already @ RagError::BuildFailure(_) => already,
            other => RagError::BuildFailure(Box::new(other)),
        }
    }

    pub(crate) fn query(self) -> Self {
        match self {
            already @ RagError::QueryFailure(_) => already,
            other => RagError::QueryFailure(Box::new(other)),
        }
    }

    /// The innermost error, looking through build/query wrappers.
    pub fn root_cause(&self) -> &RagError {
        match self {
            RagError::BuildFailure(inner) | RagError::QueryFailure(inner) => inner.root_cause(),
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikirag_core::embedding::EmbeddingErrorKind;

    #[test]
    fn test_index_dimension_mismatch_maps_to_top_level_kind() {
        let err: RagError = IndexError::DimensionMismatch {
            expected: 4,
            actual: 3,
        }
        .into();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 4,
                actual: 3
            }
        ));

        let err: RagError = IndexError::DuplicateId(7).into();
        assert!(matches!(err, RagError::Index(IndexError::DuplicateId(7))));
    }

    #[test]
    fn test_wrappers_do_not_nest() {
        let inner = RagError::from(EmbeddingError::new(
            "slice",
            EmbeddingErrorKind::Status {
                status: 500,
                body: String::new(),
            },
        ));
        let err = inner.build().build();
        match &err {
            RagError::BuildFailure(inner) => assert!(matches!(**inner, RagError::Embedding(_))),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(err.root_cause(), RagError::Embedding(_)));
    }

    #[test]
    fn test_messages_name_paths() {
        let err = RagError::corrupt("/tmp/a.zip", "missing entry id2meta.bin").query();
        assert_eq!(
            err.to_string(),
            "query failed: archive /tmp/a.zip is corrupt: missing entry id2meta.bin"
        );
    }
}
