//! Caller-owned cache of the last loaded archive.
//!
//! Reloads when the file's modification time or size changes. Call
//! [`ArchiveCache::invalidate`] after rebuilding the archive in the same
//! process; coarse mtime resolution can hide a rebuild within one tick.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use crate::archive::{load_archive, Archive};
use crate::error::{RagError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: SystemTime,
    len: u64,
}

pub struct ArchiveCache {
    path: PathBuf,
    loaded: Option<(Stamp, Arc<Archive>)>,
}

impl ArchiveCache {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            loaded: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.is_some()
    }

    /// The archive, loading it on first use or when the file changed.
    pub fn get(&mut self) -> Result<Arc<Archive>> {
        let stamp = self.stamp()?;
        if let Some((cached, archive)) = &self.loaded {
            if *cached == stamp {
                return Ok(Arc::clone(archive));
            }
            tracing::debug!(path = %self.path.display(), "archive changed on disk, reloading");
        }

        let archive = Arc::new(load_archive(&self.path)?);
        self.loaded = Some((stamp, Arc::clone(&archive)));
        Ok(archive)
    }

    /// Drop the cached archive; the next [`get`](Self::get) reloads it.
    pub fn invalidate(&mut self) {
        self.loaded = None;
    }

    fn stamp(&self) -> Result<Stamp> {
        let meta = std::fs::metadata(&self.path).map_err(|e| RagError::io(&self.path, e))?;
        Ok(Stamp {
            modified: meta.modified().map_err(|e| RagError::io(&self.path, e))?,
            len: meta.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::save_archive;
    use tempfile::TempDir;
    use wikirag_core::index::FlatL2Index;
    use wikirag_core::models::{ContentTable, MetaTable, TitleTable};

    fn archive(n: i64) -> Archive {
        let mut index = FlatL2Index::new(1).unwrap();
        let ids: Vec<i64> = (0..n).collect();
        let vectors: Vec<Vec<f32>> = ids.iter().map(|&i| vec![i as f32]).collect();
        index.add(&ids, &vectors).unwrap();
        let id2meta: MetaTable = ids.iter().map(|&i| (i, Default::default())).collect();
        let id2content: ContentTable = ids.iter().map(|&i| (i, i.to_string())).collect();
        let id2title: TitleTable = ids.iter().map(|&i| (i, format!("doc{}", i))).collect();
        Archive::new(index, id2meta, id2content, id2title, None, "m")
    }

    #[test]
    fn test_reuses_until_invalidated() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.zip");
        save_archive(&path, &archive(2)).unwrap();

        let mut cache = ArchiveCache::new(&path);
        assert!(!cache.is_loaded());
        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));

        cache.invalidate();
        assert!(!cache.is_loaded());
        let third = cache.get().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_reloads_after_rebuild() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("kb.zip");
        save_archive(&path, &archive(2)).unwrap();

        let mut cache = ArchiveCache::new(&path);
        assert_eq!(cache.get().unwrap().index.len(), 2);

        // A larger archive changes the file size even within one mtime tick.
        save_archive(&path, &archive(50)).unwrap();
        assert_eq!(cache.get().unwrap().index.len(), 50);
    }

    #[test]
    fn test_missing_file() {
        let tmp = TempDir::new().unwrap();
        let mut cache = ArchiveCache::new(tmp.path().join("absent.zip"));
        assert!(matches!(cache.get(), Err(RagError::Io { .. })));
    }
}
