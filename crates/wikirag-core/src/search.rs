//! Query-side post-processing: collapse k-NN hits to origin documents.
//!
//! Candidates arrive ordered by ascending distance. Each is looked up in
//! the `id→meta` table and grouped by its `origin_title`; only the first
//! (nearest) slice of each origin survives. Sentinel IDs and IDs without
//! an origin are skipped. No re-ranking happens beyond the input order, and
//! no extra candidates are pulled in to replace collapsed ones, so the
//! output can be shorter than the `k` used for the search.

use std::collections::HashSet;

use crate::index::Neighbor;
use crate::models::{Metadata, MetaTable, RawTable, RetrievedDocument, ORIGIN_TITLE_KEY};

/// The nearest slice of one origin document.
#[derive(Debug, Clone, PartialEq)]
pub struct OriginHit<'a> {
    pub id: i64,
    pub distance: f32,
    pub origin_title: &'a str,
    pub meta: &'a Metadata,
}

/// Keep the nearest hit per origin document, preserving distance order.
pub fn dedup_by_origin<'a>(neighbors: &[Neighbor], id2meta: &'a MetaTable) -> Vec<OriginHit<'a>> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut hits = Vec::new();

    for n in neighbors.iter().filter(|n| n.is_match()) {
        let Some(meta) = id2meta.get(&n.id) else {
            continue;
        };
        let Some(origin) = meta.get(ORIGIN_TITLE_KEY) else {
            continue;
        };
        if origin.is_empty() || !seen.insert(origin.as_str()) {
            continue;
        }
        hits.push(OriginHit {
            id: n.id,
            distance: n.distance,
            origin_title: origin,
            meta,
        });
    }

    hits
}

/// Resolve hits to whole documents, falling back to a title-only result
/// when raw storage is absent or lacks the origin.
pub fn resolve_documents(
    hits: &[OriginHit<'_>],
    id2raw: Option<&RawTable>,
) -> Vec<RetrievedDocument> {
    hits.iter()
        .map(|hit| {
            id2raw
                .and_then(|raw| raw.get(hit.origin_title))
                .map(RetrievedDocument::from)
                .unwrap_or_else(|| RetrievedDocument::title_only(hit.origin_title))
        })
        .collect()
}
