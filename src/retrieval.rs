//! Retrieval orchestrator: the build and query entry points.
//!
//! # Build
//!
//! ```text
//! data_dir/*.json ──▶ slice ──▶ embed (bounded concurrency, retried)
//!                                  │
//!                                  ▼
//!                      ids 0..N ──▶ FlatL2Index + side tables ──▶ archive.zip
//! ```
//!
//! IDs follow document order, then slice order within a document. They do
//! not depend on the order in which concurrent embedding calls complete:
//! every batch writes into its own pre-allocated slots. The first batch that
//! fails after retries aborts the build, in-flight calls are dropped, and no
//! archive is written.
//!
//! # Query
//!
//! Embed the query, take the `top_k` nearest slices, then keep only the
//! nearest slice of each origin document. Results may number fewer than
//! `top_k`; candidates lost to deduplication are not replaced.

use std::ops::Range;
use std::path::{Path, PathBuf};

use futures::stream::{self, StreamExt};
use wikirag_core::chunk::slice_document;
use wikirag_core::embedding::{Embedder, EmbeddingError, EmbeddingErrorKind};
use wikirag_core::index::FlatL2Index;
use wikirag_core::models::{
    ContentTable, Metadata, MetaTable, RawTable, RetrievedDocument, TitleTable,
};
use wikirag_core::search::{dedup_by_origin, resolve_documents, OriginHit};

use crate::archive::{load_archive, save_archive, Archive};
use crate::config::Config;
use crate::documents::load_documents;
use crate::error::{RagError, Result};
use crate::progress::{BuildProgressEvent, BuildProgressReporter};
use crate::retry::RetryPolicy;

/// Inputs of a build pass.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    pub data_dir: PathBuf,
    pub archive_path: PathBuf,
    pub include_globs: Vec<String>,
    pub max_length: usize,
    pub context_length: usize,
    /// Embedding calls in flight at once.
    pub concurrency: usize,
    /// Slices per embedding call.
    pub batch_size: usize,
    pub store_raw: bool,
    pub retry: RetryPolicy,
}

impl BuildOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            data_dir: config.source.data_dir.clone(),
            archive_path: config.archive.path.clone(),
            include_globs: config.source.include_globs.clone(),
            max_length: config.chunking.max_length,
            context_length: config.chunking.context_length,
            concurrency: config.embedding.concurrency,
            batch_size: config.embedding.batch_size,
            store_raw: config.archive.store_raw,
            retry: config.embedding.retry_policy(),
        }
    }
}

/// Outcome of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub vectors: usize,
    pub documents: usize,
    pub dims: usize,
    pub archive_path: PathBuf,
}

/// Slice, embed and index every document under `opts.data_dir`, then write
/// the archive to `opts.archive_path`.
///
/// Any failure is returned as [`RagError::BuildFailure`]; an existing
/// archive at the destination is left untouched in that case.
pub async fn build(
    opts: &BuildOptions,
    embedder: &dyn Embedder,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildReport> {
    build_inner(opts, embedder, progress)
        .await
        .map_err(RagError::build)
}

async fn build_inner(
    opts: &BuildOptions,
    embedder: &dyn Embedder,
    progress: &dyn BuildProgressReporter,
) -> Result<BuildReport> {
    tracing::info!(
        data_dir = %opts.data_dir.display(),
        archive = %opts.archive_path.display(),
        model = embedder.model_name(),
        "build started"
    );

    progress.report(BuildProgressEvent::Discovering {
        dir: opts.data_dir.clone(),
    });
    let documents = load_documents(&opts.data_dir, &opts.include_globs)?;

    let mut texts: Vec<String> = Vec::new();
    let mut id2meta = MetaTable::new();
    let mut id2content = ContentTable::new();
    let mut id2title = TitleTable::new();

    for doc in &documents {
        for slice in slice_document(doc, opts.max_length, opts.context_length)? {
            let id = texts.len() as i64;
            id2meta.insert(id, slice.metadata(&doc.meta));
            id2title.insert(id, slice.origin_title);
            id2content.insert(id, slice.text.clone());
            texts.push(slice.text);
        }
    }

    progress.report(BuildProgressEvent::Slicing {
        documents: documents.len() as u64,
        slices: texts.len() as u64,
    });
    tracing::info!(
        documents = documents.len(),
        slices = texts.len(),
        "documents sliced"
    );

    if texts.is_empty() {
        return Err(RagError::EmptyCorpus(opts.data_dir.clone()));
    }

    let vectors = embed_all(&texts, embedder, opts, progress).await?;

    let ids: Vec<i64> = (0..vectors.len() as i64).collect();
    let dims = vectors.first().map(Vec::len).unwrap_or_default();
    let mut index = FlatL2Index::new(dims)?;
    index.add(&ids, &vectors)?;

    let id2raw: Option<RawTable> = opts.store_raw.then(|| {
        documents
            .iter()
            .map(|doc| (doc.title.clone(), doc.to_raw()))
            .collect()
    });

    let archive = Archive::new(
        index,
        id2meta,
        id2content,
        id2title,
        id2raw,
        embedder.model_name(),
    );

    progress.report(BuildProgressEvent::Writing {
        path: opts.archive_path.clone(),
    });
    let manifest = save_archive(&opts.archive_path, &archive)?;

    tracing::info!(
        vectors = manifest.vectors,
        dims = manifest.dims,
        "build finished"
    );
    Ok(BuildReport {
        vectors: manifest.vectors,
        documents: manifest.documents,
        dims: manifest.dims,
        archive_path: opts.archive_path.clone(),
    })
}

/// Embed `texts` in batches with at most `opts.concurrency` calls in
/// flight. The returned vectors are in input order.
async fn embed_all(
    texts: &[String],
    embedder: &dyn Embedder,
    opts: &BuildOptions,
    progress: &dyn BuildProgressReporter,
) -> Result<Vec<Vec<f32>>> {
    let total = texts.len();
    let batch_size = opts.batch_size.max(1);
    let retry = opts.retry;

    let batches = (0..total)
        .step_by(batch_size)
        .map(|start| start..(start + batch_size).min(total));

    let mut in_flight = stream::iter(batches)
        .map(|range: Range<usize>| async move {
            let batch = &texts[range.clone()];
            let vectors = retry.run(|| embedder.embed(batch)).await?;
            if vectors.len() != batch.len() {
                return Err(EmbeddingError::new(
                    &batch[0],
                    EmbeddingErrorKind::Malformed(format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        vectors.len()
                    )),
                ));
            }
            Ok::<_, EmbeddingError>((range, vectors))
        })
        .buffer_unordered(opts.concurrency.max(1));

    let mut slots: Vec<Option<Vec<f32>>> = vec![None; total];
    let mut done = 0usize;
    while let Some(result) = in_flight.next().await {
        let (range, vectors) = result?;
        done += range.len();
        for (slot, vector) in slots[range].iter_mut().zip(vectors) {
            *slot = Some(vector);
        }
        progress.report(BuildProgressEvent::Embedding {
            n: done as u64,
            total: total as u64,
        });
    }

    Ok(slots.into_iter().flatten().collect())
}

/// Query-time knobs.
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    pub top_k: usize,
    pub retry: RetryPolicy,
}

impl QueryOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            retry: config.embedding.retry_policy(),
        }
    }

    fn is_trivial(&self, text: &str) -> bool {
        self.top_k == 0 || text.trim().is_empty()
    }
}

/// Load the archive at `archive_path` and return the nearest whole
/// documents for `text`, one per origin, nearest first.
pub async fn query(
    archive_path: &Path,
    text: &str,
    embedder: &dyn Embedder,
    opts: &QueryOptions,
) -> Result<Vec<RetrievedDocument>> {
    if opts.is_trivial(text) {
        return Ok(Vec::new());
    }
    let archive = load_archive(archive_path).map_err(RagError::query)?;
    query_archive(&archive, text, embedder, opts).await
}

/// Like [`query`], but returns the metadata of the nearest slice of each
/// origin instead of the whole document.
pub async fn query_meta_only(
    archive_path: &Path,
    text: &str,
    embedder: &dyn Embedder,
    opts: &QueryOptions,
) -> Result<Vec<Metadata>> {
    if opts.is_trivial(text) {
        return Ok(Vec::new());
    }
    let archive = load_archive(archive_path).map_err(RagError::query)?;
    query_meta_only_archive(&archive, text, embedder, opts).await
}

/// [`query`] against an archive that is already in memory.
pub async fn query_archive(
    archive: &Archive,
    text: &str,
    embedder: &dyn Embedder,
    opts: &QueryOptions,
) -> Result<Vec<RetrievedDocument>> {
    if opts.is_trivial(text) {
        return Ok(Vec::new());
    }
    let hits = nearest_origins(archive, text, embedder, opts)
        .await
        .map_err(RagError::query)?;
    Ok(resolve_documents(&hits, archive.id2raw.as_ref()))
}

/// [`query_meta_only`] against an archive that is already in memory.
pub async fn query_meta_only_archive(
    archive: &Archive,
    text: &str,
    embedder: &dyn Embedder,
    opts: &QueryOptions,
) -> Result<Vec<Metadata>> {
    if opts.is_trivial(text) {
        return Ok(Vec::new());
    }
    let hits = nearest_origins(archive, text, embedder, opts)
        .await
        .map_err(RagError::query)?;
    Ok(hits.into_iter().map(|hit| hit.meta.clone()).collect())
}

async fn nearest_origins<'a>(
    archive: &'a Archive,
    text: &str,
    embedder: &dyn Embedder,
    opts: &QueryOptions,
) -> Result<Vec<OriginHit<'a>>> {
    if embedder.model_name() != archive.manifest.model {
        tracing::warn!(
            archive_model = %archive.manifest.model,
            query_model = embedder.model_name(),
            "query embedder differs from the model the archive was built with"
        );
    }

    let vector = opts.retry.run(|| embedder.embed_one(text)).await?;
    if vector.len() != archive.index.dims() {
        return Err(RagError::DimensionMismatch {
            expected: archive.index.dims(),
            actual: vector.len(),
        });
    }

    let neighbors = archive.index.search(&vector, opts.top_k)?;
    let hits = dedup_by_origin(&neighbors, &archive.id2meta);
    tracing::info!(
        candidates = neighbors.len(),
        results = hits.len(),
        "query answered"
    );
    Ok(hits)
}
