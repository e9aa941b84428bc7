//! # wikirag core
//!
//! I/O-free building blocks of the retrieval pipeline: the document model,
//! the slicer, the [`Embedder`](embedding::Embedder) seam, the ID-mapped
//! flat L2 index with its native binary form, and the dedup-by-origin step
//! of the query path.
//!
//! This crate has no tokio, filesystem, or network dependencies. Archive
//! packaging, the HTTP embedding client, and orchestration live in the
//! `wikirag` crate.

pub mod chunk;
pub mod embedding;
pub mod index;
pub mod models;
pub mod search;
