//! Archive Store: one zip file holding the vector index and its side tables.
//!
//! # Layout
//!
//! | Entry | Encoding | Content |
//! |-------|----------|---------|
//! | `vectors.index` | native index codec | [`FlatL2Index`] |
//! | `id2meta.bin` | bincode | `id → metadata` |
//! | `id2content.bin` | bincode | `id → slice text` |
//! | `id2title.bin` | bincode | `id → origin title` |
//! | `id2raw.bin` | bincode, optional | `title → whole document` |
//! | `manifest.json` | JSON | [`ArchiveManifest`] |
//!
//! Saving stages everything in a temporary file next to the destination and
//! renames it into place once complete, so readers never observe a
//! half-written archive. Loading is all-or-nothing: any missing entry,
//! undecodable table, checksum mismatch or broken cross-reference fails with
//! [`RagError::ArchiveCorrupt`].

use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use wikirag_core::index::FlatL2Index;
use wikirag_core::models::{ContentTable, MetaTable, RawTable, TitleTable, ORIGIN_TITLE_KEY};
use zip::result::ZipError;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::error::{RagError, Result};

pub const INDEX_ENTRY: &str = "vectors.index";
pub const META_ENTRY: &str = "id2meta.bin";
pub const CONTENT_ENTRY: &str = "id2content.bin";
pub const TITLE_ENTRY: &str = "id2title.bin";
pub const RAW_ENTRY: &str = "id2raw.bin";
pub const MANIFEST_ENTRY: &str = "manifest.json";

pub const ARCHIVE_FORMAT_VERSION: u32 = 1;

/// Build-time facts recorded alongside the tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveManifest {
    pub format_version: u32,
    /// Embedding model the vectors were produced with.
    pub model: String,
    pub dims: usize,
    pub vectors: usize,
    pub documents: usize,
    pub has_raw: bool,
    pub built_at: DateTime<Utc>,
    /// Lowercase hex SHA-256 of the `vectors.index` entry. Filled in by
    /// [`save_archive`].
    pub index_sha256: String,
}

/// Everything a query needs, fully loaded into memory.
#[derive(Debug, Clone)]
pub struct Archive {
    pub index: FlatL2Index,
    pub id2meta: MetaTable,
    pub id2content: ContentTable,
    pub id2title: TitleTable,
    pub id2raw: Option<RawTable>,
    pub manifest: ArchiveManifest,
}

impl Archive {
    /// Assemble an archive from freshly built parts, stamping a manifest.
    pub fn new(
        index: FlatL2Index,
        id2meta: MetaTable,
        id2content: ContentTable,
        id2title: TitleTable,
        id2raw: Option<RawTable>,
        model: impl Into<String>,
    ) -> Self {
        let documents = match &id2raw {
            Some(raw) => raw.len(),
            None => id2title.values().collect::<BTreeSet<_>>().len(),
        };
        let manifest = ArchiveManifest {
            format_version: ARCHIVE_FORMAT_VERSION,
            model: model.into(),
            dims: index.dims(),
            vectors: index.len(),
            documents,
            has_raw: id2raw.is_some(),
            built_at: Utc::now(),
            index_sha256: String::new(),
        };
        Self {
            index,
            id2meta,
            id2content,
            id2title,
            id2raw,
            manifest,
        }
    }

    /// Check the cross-table invariant: every indexed ID has metadata,
    /// content and a title, and every origin title resolves in the raw
    /// table when one is present.
    pub fn check_consistency(&self) -> std::result::Result<(), String> {
        for &id in self.index.ids() {
            if !self.id2meta.contains_key(&id) {
                return Err(format!("id {} has no entry in {}", id, META_ENTRY));
            }
            if !self.id2content.contains_key(&id) {
                return Err(format!("id {} has no entry in {}", id, CONTENT_ENTRY));
            }
            if !self.id2title.contains_key(&id) {
                return Err(format!("id {} has no entry in {}", id, TITLE_ENTRY));
            }
        }
        if let Some(raw) = &self.id2raw {
            for (id, meta) in &self.id2meta {
                if let Some(origin) = meta.get(ORIGIN_TITLE_KEY) {
                    if !raw.contains_key(origin) {
                        return Err(format!(
                            "id {} references {:?}, which has no entry in {}",
                            id, origin, RAW_ENTRY
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Write `archive` to `path`, replacing any existing file atomically.
///
/// Returns the manifest as written, including the index checksum.
pub fn save_archive(path: &Path, archive: &Archive) -> Result<ArchiveManifest> {
    let dir = parent_dir(path);
    std::fs::create_dir_all(&dir).map_err(|e| RagError::io(&dir, e))?;

    let mut staged = tempfile::NamedTempFile::new_in(&dir).map_err(|e| RagError::io(&dir, e))?;
    let manifest = write_entries(staged.as_file_mut(), archive).map_err(|e| RagError::io(path, e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| RagError::io(staged.path(), e))?;
    staged
        .persist(path)
        .map_err(|e| RagError::io(path, e.error))?;

    tracing::info!(
        path = %path.display(),
        vectors = manifest.vectors,
        documents = manifest.documents,
        "archive written"
    );
    Ok(manifest)
}

fn write_entries(file: &mut File, archive: &Archive) -> io::Result<ArchiveManifest> {
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut zip = ZipWriter::new(file);

    // The index goes through a scoped temp file; it is removed on drop.
    let mut blob = tempfile::tempfile()?;
    archive.index.write_to(&mut blob)?;
    blob.rewind()?;
    let mut hasher = Sha256::new();
    io::copy(&mut blob, &mut hasher)?;
    let index_sha256 = format!("{:x}", hasher.finalize());
    blob.rewind()?;

    zip.start_file(INDEX_ENTRY, options).map_err(zip_to_io)?;
    io::copy(&mut blob, &mut zip)?;
    tracing::debug!(entry = INDEX_ENTRY, sha256 = %index_sha256, "wrote entry");

    write_table(&mut zip, options, META_ENTRY, &archive.id2meta)?;
    write_table(&mut zip, options, CONTENT_ENTRY, &archive.id2content)?;
    write_table(&mut zip, options, TITLE_ENTRY, &archive.id2title)?;
    if let Some(raw) = &archive.id2raw {
        write_table(&mut zip, options, RAW_ENTRY, raw)?;
    }

    let manifest = ArchiveManifest {
        index_sha256,
        ..archive.manifest.clone()
    };
    zip.start_file(MANIFEST_ENTRY, options).map_err(zip_to_io)?;
    serde_json::to_writer_pretty(&mut zip, &manifest)?;

    zip.finish().map_err(zip_to_io)?;
    Ok(manifest)
}

fn write_table<W, T>(
    zip: &mut ZipWriter<W>,
    options: SimpleFileOptions,
    name: &str,
    table: &T,
) -> io::Result<()>
where
    W: Write + Seek,
    T: Serialize,
{
    zip.start_file(name, options).map_err(zip_to_io)?;
    bincode::serialize_into(&mut *zip, table).map_err(|e| io::Error::other(e.to_string()))?;
    tracing::debug!(entry = name, "wrote entry");
    Ok(())
}

/// Read and verify the archive at `path`.
pub fn load_archive(path: &Path) -> Result<Archive> {
    let file = File::open(path).map_err(|e| RagError::io(path, e))?;
    let corrupt = |reason: String| RagError::corrupt(path, reason);

    let mut zip = ZipArchive::new(file).map_err(|e| corrupt(format!("not a zip archive: {}", e)))?;

    let manifest: ArchiveManifest = with_entry(&mut zip, MANIFEST_ENTRY, |entry| {
        serde_json::from_reader(entry).map_err(|e| e.to_string())
    })
    .map_err(&corrupt)?;
    if manifest.format_version != ARCHIVE_FORMAT_VERSION {
        return Err(corrupt(format!(
            "unsupported archive format version {}",
            manifest.format_version
        )));
    }

    let index = read_index(&mut zip, &manifest).map_err(&corrupt)?;
    let id2meta: MetaTable = read_table(&mut zip, META_ENTRY).map_err(&corrupt)?;
    let id2content: ContentTable = read_table(&mut zip, CONTENT_ENTRY).map_err(&corrupt)?;
    let id2title: TitleTable = read_table(&mut zip, TITLE_ENTRY).map_err(&corrupt)?;
    let id2raw: Option<RawTable> = if manifest.has_raw {
        Some(read_table(&mut zip, RAW_ENTRY).map_err(&corrupt)?)
    } else {
        None
    };

    let archive = Archive {
        index,
        id2meta,
        id2content,
        id2title,
        id2raw,
        manifest,
    };
    archive.check_consistency().map_err(&corrupt)?;

    tracing::debug!(
        path = %path.display(),
        vectors = archive.index.len(),
        "archive loaded"
    );
    Ok(archive)
}

/// Run `f` over the named entry. Errors are prefixed with the entry name.
fn with_entry<T>(
    zip: &mut ZipArchive<File>,
    name: &str,
    f: impl FnOnce(&mut dyn Read) -> std::result::Result<T, String>,
) -> std::result::Result<T, String> {
    let mut entry = zip.by_name(name).map_err(|e| match e {
        ZipError::FileNotFound => format!("missing entry {}", name),
        other => format!("{}: {}", name, other),
    })?;
    f(&mut entry).map_err(|e| format!("{}: {}", name, e))
}

fn read_index(
    zip: &mut ZipArchive<File>,
    manifest: &ArchiveManifest,
) -> std::result::Result<FlatL2Index, String> {
    let io_err = |e: io::Error| format!("{}: {}", INDEX_ENTRY, e);

    // Staged through a scoped temp file; it is removed on drop.
    let mut blob = tempfile::tempfile().map_err(io_err)?;
    with_entry(zip, INDEX_ENTRY, |entry| {
        io::copy(entry, &mut blob).map_err(|e| e.to_string())
    })?;
    blob.rewind().map_err(io_err)?;
    let mut bytes = Vec::new();
    blob.read_to_end(&mut bytes).map_err(io_err)?;

    let actual = format!("{:x}", Sha256::digest(&bytes));
    if actual != manifest.index_sha256 {
        return Err(format!(
            "{} checksum mismatch: manifest {}, actual {}",
            INDEX_ENTRY, manifest.index_sha256, actual
        ));
    }

    let index = FlatL2Index::from_bytes(&bytes).map_err(|e| format!("{}: {}", INDEX_ENTRY, e))?;
    if index.len() != manifest.vectors || index.dims() != manifest.dims {
        return Err(format!(
            "{} holds {} vectors of {} dims, manifest says {} of {}",
            INDEX_ENTRY,
            index.len(),
            index.dims(),
            manifest.vectors,
            manifest.dims
        ));
    }
    Ok(index)
}

fn read_table<T: DeserializeOwned>(
    zip: &mut ZipArchive<File>,
    name: &str,
) -> std::result::Result<T, String> {
    with_entry(zip, name, |entry| {
        bincode::deserialize_from(entry).map_err(|e| e.to_string())
    })
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

fn zip_to_io(err: ZipError) -> io::Error {
    match err {
        ZipError::Io(e) => e,
        other => io::Error::other(other.to_string()),
    }
}
