//! # wikirag
//!
//! Retrieval core for a wiki knowledge base.
//!
//! Cleaned documents are cut into context-padded slices, embedded by a
//! remote OpenAI-compatible service, and stored in an exact L2 vector index
//! that is packed together with its side tables into one zip archive.
//! Queries embed the question, take the nearest slices, and collapse them
//! to one result per origin document.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌───────────────┐   ┌──────────────┐
//! │ data_dir/  │──▶│ Slice + Embed │──▶│ archive.zip  │
//! │  *.json    │   │ (concurrent)  │   │ index+tables │
//! └────────────┘   └───────────────┘   └──────┬───────┘
//!                                             │
//!                               ┌─────────────┤
//!                               ▼             ▼
//!                          ┌─────────┐   ┌─────────┐
//!                          │  query  │   │ context │
//!                          └─────────┘   └─────────┘
//! ```
//!
//! Pure logic (chunker, index, dedup) lives in [`wikirag_core`]; this crate
//! adds the network, filesystem and CLI-facing parts.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`documents`] | Loading cleaned documents from disk |
//! | [`embedding`] | HTTP embedding client |
//! | [`retry`] | Bounded retry for embedding calls |
//! | [`archive`] | Archive save/load |
//! | [`retrieval`] | Build and query entry points |
//! | [`cache`] | Caller-owned archive cache |
//! | [`context`] | Context assembly for generation |
//! | [`progress`] | Build progress reporting |
//! | [`error`] | Error taxonomy |

pub mod archive;
pub mod cache;
pub mod config;
pub mod context;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod progress;
pub mod retrieval;
pub mod retry;

pub use error::{RagError, Result};
pub use wikirag_core::models;
