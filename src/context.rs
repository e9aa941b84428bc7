//! Grounding context for a downstream generation call.

use std::collections::HashSet;

use wikirag_core::models::Metadata;

use crate::archive::Archive;

/// Join the slice texts whose stored metadata equals one of `metas`.
///
/// Slices are taken per record in ID order, each at most once, joined with
/// `\n` and cut to at most `max_chars` characters.
pub fn assemble_context(archive: &Archive, metas: &[Metadata], max_chars: usize) -> String {
    let mut used: HashSet<i64> = HashSet::new();
    let mut fragments: Vec<&str> = Vec::new();

    for wanted in metas {
        for (id, meta) in &archive.id2meta {
            if meta == wanted && used.insert(*id) {
                if let Some(text) = archive.id2content.get(id) {
                    fragments.push(text);
                }
            }
        }
    }

    let merged = fragments.join("\n");
    match merged.char_indices().nth(max_chars) {
        Some((cut, _)) => merged[..cut].to_string(),
        None => merged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wikirag_core::index::FlatL2Index;
    use wikirag_core::models::{
        ContentTable, MetaTable, TitleTable, ORIGIN_TITLE_KEY, SLICE_INDEX_KEY,
    };

    fn meta(origin: &str, slice: usize) -> Metadata {
        let mut m = Metadata::new();
        m.insert(ORIGIN_TITLE_KEY.into(), origin.into());
        m.insert(SLICE_INDEX_KEY.into(), slice.to_string());
        m
    }

    fn archive() -> Archive {
        let mut index = FlatL2Index::new(1).unwrap();
        index.add(&[0, 1, 2], &[vec![0.0], vec![1.0], vec![2.0]]).unwrap();
        let id2meta: MetaTable = [(0, meta("A", 1)), (1, meta("A", 2)), (2, meta("B", 1))].into();
        let id2content: ContentTable = [
            (0, "alpha".to_string()),
            (1, "beta".to_string()),
            (2, "三月七".to_string()),
        ]
        .into();
        let id2title: TitleTable = [
            (0, "A".to_string()),
            (1, "A".to_string()),
            (2, "B".to_string()),
        ]
        .into();
        Archive::new(index, id2meta, id2content, id2title, None, "m")
    }

    #[test]
    fn test_joins_in_request_order() {
        let a = archive();
        let context = assemble_context(&a, &[meta("B", 1), meta("A", 1)], 1000);
        assert_eq!(context, "三月七\nalpha");
    }

    #[test]
    fn test_each_slice_used_once() {
        let a = archive();
        let context = assemble_context(&a, &[meta("A", 2), meta("A", 2)], 1000);
        assert_eq!(context, "beta");
    }

    #[test]
    fn test_truncates_on_char_boundary() {
        let a = archive();
        let context = assemble_context(&a, &[meta("B", 1), meta("A", 1)], 2);
        assert_eq!(context, "三月");
        assert!(assemble_context(&a, &[meta("C", 1)], 10).is_empty());
    }
}
