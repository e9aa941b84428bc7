//! Load cleaned wiki documents from a directory.
//!
//! Each file matching one of the include globs (default `*.json`) directly
//! under the data directory is one document. Its title is the file stem and
//! its body is `{"content": "...", "meta": {...}}`. Files are returned in
//! lexicographic path order so ID assignment is reproducible.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use walkdir::WalkDir;
use wikirag_core::models::Document;

use crate::error::{RagError, Result};

pub fn load_documents(data_dir: &Path, include_globs: &[String]) -> Result<Vec<Document>> {
    let include_set = build_globset(data_dir, include_globs)?;

    let mut paths: Vec<PathBuf> = Vec::new();
    for entry in WalkDir::new(data_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(data_dir).to_path_buf();
            match e.into_io_error() {
                Some(io) => RagError::io(path, io),
                None => RagError::io(path, std::io::Error::other("directory walk failed")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if include_set.is_match(entry.file_name()) {
            paths.push(entry.into_path());
        }
    }
    paths.sort();

    let mut documents = Vec::with_capacity(paths.len());
    let mut seen: HashMap<String, &Path> = HashMap::new();
    for path in &paths {
        let doc = read_document(path)?;
        if let Some(first) = seen.insert(doc.title.clone(), path) {
            return Err(RagError::InvalidDocument {
                path: path.clone(),
                reason: format!("title {:?} is already taken by {}", doc.title, first.display()),
            });
        }
        documents.push(doc);
    }

    tracing::debug!(
        dir = %data_dir.display(),
        documents = documents.len(),
        "loaded documents"
    );
    Ok(documents)
}

fn read_document(path: &Path) -> Result<Document> {
    let title = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .filter(|s| !s.is_empty())
        .ok_or_else(|| RagError::InvalidDocument {
            path: path.to_path_buf(),
            reason: "file name has no stem".to_string(),
        })?;

    let body = std::fs::read_to_string(path).map_err(|e| RagError::io(path, e))?;
    Document::from_json(&title, &body).map_err(|e| RagError::InvalidDocument {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn build_globset(data_dir: &Path, patterns: &[String]) -> Result<GlobSet> {
    let invalid = |reason: String| RagError::InvalidDocument {
        path: data_dir.to_path_buf(),
        reason,
    };

    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob =
            Glob::new(pattern).map_err(|e| invalid(format!("bad include glob {pattern:?}: {e}")))?;
        builder.add(glob);
    }
    builder
        .build()
        .map_err(|e| invalid(format!("bad include globs: {e}")))
}
