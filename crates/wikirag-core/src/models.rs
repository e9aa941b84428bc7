//! Core data models that flow through the build and query pipelines.
//!
//! Metadata is an open string-to-string map. The pipeline itself only
//! injects the two reserved keys [`SLICE_INDEX_KEY`] and
//! [`ORIGIN_TITLE_KEY`]; every other key is supplied by the cleaning stage
//! and carried through untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Open metadata mapping attached to documents and slices.
pub type Metadata = BTreeMap<String, String>;

/// Reserved key: 1-based position of a slice within its document.
pub const SLICE_INDEX_KEY: &str = "slice_index";

/// Reserved key: title of the document a slice was cut from.
pub const ORIGIN_TITLE_KEY: &str = "origin_title";

/// `id→meta` side table.
pub type MetaTable = BTreeMap<i64, Metadata>;
/// `id→content` side table.
pub type ContentTable = BTreeMap<i64, String>;
/// `id→title` side table.
pub type TitleTable = BTreeMap<i64, String>;
/// `title→raw` side table, keyed by origin title rather than vector ID.
pub type RawTable = BTreeMap<String, RawDocument>;

/// A cleaned source document, keyed by its title.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub title: String,
    pub content: String,
    pub meta: Metadata,
}

impl Document {
    pub fn new(title: impl Into<String>, content: impl Into<String>, meta: Metadata) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            meta,
        }
    }

    /// Parse the on-disk document form `{"content": "...", "meta": {...}}`.
    ///
    /// Both fields are optional. Non-string metadata values are kept as
    /// their JSON text so the map stays string-typed.
    pub fn from_json(title: &str, json: &str) -> Result<Self, serde_json::Error> {
        #[derive(Deserialize)]
        struct Wire {
            #[serde(default)]
            content: String,
            #[serde(default)]
            meta: serde_json::Map<String, serde_json::Value>,
        }

        let wire: Wire = serde_json::from_str(json)?;
        let meta = wire
            .meta
            .into_iter()
            .map(|(k, v)| {
                let v = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, v)
            })
            .collect();

        Ok(Self::new(title, wire.content, meta))
    }

    /// The side-table record kept for whole-document results.
    pub fn to_raw(&self) -> RawDocument {
        RawDocument {
            title: self.title.clone(),
            content: self.content.clone(),
            meta: self.meta.clone(),
        }
    }
}

/// A bounded, context-padded substring of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    pub origin_title: String,
    /// 1-based position within the origin document.
    pub slice_index: usize,
    pub text: String,
}

impl Slice {
    /// Document metadata merged with the reserved slice keys.
    pub fn metadata(&self, document_meta: &Metadata) -> Metadata {
        let mut meta = document_meta.clone();
        meta.insert(SLICE_INDEX_KEY.to_string(), self.slice_index.to_string());
        meta.insert(ORIGIN_TITLE_KEY.to_string(), self.origin_title.clone());
        meta
    }
}

/// Whole original document stored in the `id→raw` side table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawDocument {
    pub title: String,
    pub content: String,
    pub meta: Metadata,
}

/// A deduplicated full-document query result.
///
/// When the archive was built without raw storage only the title is known,
/// and the result serializes as `{"title": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub meta: Option<Metadata>,
}

impl RetrievedDocument {
    pub fn title_only(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: None,
            meta: None,
        }
    }
}

impl From<&RawDocument> for RetrievedDocument {
    fn from(raw: &RawDocument) -> Self {
        Self {
            title: raw.title.clone(),
            content: Some(raw.content.clone()),
            meta: Some(raw.meta.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_json_stringifies_meta() {
        let doc = Document::from_json(
            "Stelle",
            r#"{"content": "body", "meta": {"path": "Destruction", "rarity": 5, "tags": ["a"]}}"#,
        )
        .unwrap();
        assert_eq!(doc.title, "Stelle");
        assert_eq!(doc.content, "body");
        assert_eq!(doc.meta["path"], "Destruction");
        assert_eq!(doc.meta["rarity"], "5");
        assert_eq!(doc.meta["tags"], r#"["a"]"#);
    }

    #[test]
    fn test_from_json_missing_fields() {
        let doc = Document::from_json("empty", "{}").unwrap();
        assert!(doc.content.is_empty());
        assert!(doc.meta.is_empty());
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(Document::from_json("bad", "not json").is_err());
    }

    #[test]
    fn test_slice_metadata_overrides_reserved_keys() {
        let mut meta = Metadata::new();
        meta.insert("category".into(), "character".into());
        meta.insert(ORIGIN_TITLE_KEY.into(), "spoofed".into());

        let slice = Slice {
            origin_title: "March 7th".into(),
            slice_index: 2,
            text: "...".into(),
        };
        let merged = slice.metadata(&meta);
        assert_eq!(merged["category"], "character");
        assert_eq!(merged[ORIGIN_TITLE_KEY], "March 7th");
        assert_eq!(merged[SLICE_INDEX_KEY], "2");
    }

    #[test]
    fn test_title_only_serializes_without_optional_fields() {
        let json = serde_json::to_string(&RetrievedDocument::title_only("Doc2")).unwrap();
        assert_eq!(json, r#"{"title":"Doc2"}"#);
    }
}
