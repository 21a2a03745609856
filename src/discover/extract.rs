//! Candidate extraction from a single document.
//!
//! Walks a document and emits a [`CandidateLink`] for every value that could
//! be a reference. Elements reached through arrays share one path with an
//! [`ARRAY_MARKER`] segment, since indices mean nothing across documents.
//!
//! Arrays of plain scalars (numbers, non-identifier strings, ...) are never
//! descended into, not even in full-scan mode.

use mongodb::bson::Bson;

use crate::document::{looks_like_object_id, parse_object_id, Document, DocumentResult, PRIMARY_KEY};

use super::link::{CandidateLink, ARRAY_MARKER};

/// Knobs controlling what the extractor emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Emit a presence-only candidate for every plain scalar field.
    pub full_scan: bool,
    /// Emit candidates for identifier elements of arrays.
    pub identifier_arrays: bool,
}

/// Extract candidate links from `doc`, prefixing every path with `prefix`.
///
/// The `_id` field is skipped at every nesting level. A string that has the
/// shape of an identifier but fails to decode aborts the whole document.
pub fn linkify(
    doc: &Document,
    prefix: &str,
    options: ExtractOptions,
) -> DocumentResult<Vec<CandidateLink>> {
    let mut links = Vec::new();
    walk_document(doc, prefix, options, &mut links)?;
    Ok(links)
}

fn walk_document(
    doc: &Document,
    prefix: &str,
    options: ExtractOptions,
    out: &mut Vec<CandidateLink>,
) -> DocumentResult<()> {
    for (field, value) in doc.iter() {
        if field == PRIMARY_KEY {
            continue;
        }
        let path = join_path(prefix, field);

        match value {
            Bson::ObjectId(id) => out.push(CandidateLink::new(path, id.to_hex())),
            Bson::String(s) if looks_like_object_id(s) => {
                out.push(CandidateLink::new(path, parse_object_id(s)?.to_hex()))
            }
            Bson::Document(inner) => walk_document(inner, &path, options, out)?,
            Bson::Array(items) => walk_array(items, &path, options, out)?,
            _ => {
                if options.full_scan {
                    out.push(CandidateLink::presence(path));
                }
            }
        }
    }
    Ok(())
}

fn walk_array(
    items: &[Bson],
    path: &str,
    options: ExtractOptions,
    out: &mut Vec<CandidateLink>,
) -> DocumentResult<()> {
    let element_path = join_path(path, ARRAY_MARKER);

    for item in items {
        match item {
            Bson::Document(inner) => walk_document(inner, &element_path, options, out)?,
            Bson::ObjectId(id) if options.identifier_arrays => {
                out.push(CandidateLink::new(element_path.clone(), id.to_hex()))
            }
            Bson::String(s) if options.identifier_arrays && looks_like_object_id(s) => out.push(
                CandidateLink::new(element_path.clone(), parse_object_id(s)?.to_hex()),
            ),
            _ => {}
        }
    }
    Ok(())
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{doc, ObjectId};

    const IDS_ONLY: ExtractOptions = ExtractOptions {
        full_scan: false,
        identifier_arrays: false,
    };

    fn sorted(mut links: Vec<CandidateLink>) -> Vec<CandidateLink> {
        links.sort();
        links
    }

    fn link(path: &str, id: ObjectId) -> CandidateLink {
        CandidateLink::new(path, id.to_hex())
    }

    #[test]
    fn test_nominal_skips_primary_key_and_plain_strings() {
        let id1 = ObjectId::new();
        let doc = doc! { "keyField": "valueField", "eeeeeId": id1, "_id": id1 };

        let links = linkify(&doc, "", IDS_ONLY).unwrap();
        assert_eq!(links, vec![link("eeeeeId", id1)]);
    }

    #[test]
    fn test_nested_document() {
        let id1 = ObjectId::new();
        let doc = doc! { "keyField": "valueField", "eeeee": { "testId": id1 } };

        let links = linkify(&doc, "", IDS_ONLY).unwrap();
        assert_eq!(links, vec![link("eeeee.testId", id1)]);
    }

    #[test]
    fn test_multiple_nested() {
        let (id1, id2) = (ObjectId::new(), ObjectId::new());
        let doc = doc! {
            "keyField": "valueField",
            "eeeee1": id1,
            "aaaaaaaa2": id2,
            "nested": { "field1": id1, "field2": id2 },
        };

        let links = sorted(linkify(&doc, "", IDS_ONLY).unwrap());
        assert_eq!(
            links,
            sorted(vec![
                link("eeeee1", id1),
                link("aaaaaaaa2", id2),
                link("nested.field1", id1),
                link("nested.field2", id2),
            ])
        );
    }

    #[test]
    fn test_identifier_stored_as_string() {
        let id1 = ObjectId::new();
        let doc = doc! { "asString": id1.to_hex(), "asUpper": id1.to_hex().to_uppercase() };

        let links = sorted(linkify(&doc, "", IDS_ONLY).unwrap());
        // Values are normalised to the canonical lowercase form
        assert_eq!(links, vec![link("asString", id1), link("asUpper", id1)]);
    }

    #[test]
    fn test_array_of_documents_shares_marker_path() {
        let items: Vec<Document> = (0..3)
            .map(|_| {
                let id = ObjectId::new();
                doc! { "productId": id, "meta": { "ownerId": id } }
            })
            .collect();
        let doc = doc! { "lines": items };

        let links = linkify(&doc, "", IDS_ONLY).unwrap();
        assert_eq!(links.len(), 6);
        assert_eq!(
            links.iter().filter(|l| l.path == "lines.$.productId").count(),
            3
        );
        assert_eq!(
            links.iter().filter(|l| l.path == "lines.$.meta.ownerId").count(),
            3
        );
    }

    #[test]
    fn test_nested_arrays_of_documents() {
        let id = ObjectId::new();
        let doc = doc! { "outer": [ { "refs": [ { "targetId": id } ] } ] };

        let links = linkify(&doc, "", IDS_ONLY).unwrap();
        assert_eq!(links, vec![link("outer.$.refs.$.targetId", id)]);
    }

    #[test]
    fn test_identifier_arrays_follow_option() {
        let (id1, id2) = (ObjectId::new(), ObjectId::new());
        let doc = doc! { "bIds": [id1, id2] };

        assert!(linkify(&doc, "", IDS_ONLY).unwrap().is_empty());

        let options = ExtractOptions {
            identifier_arrays: true,
            ..IDS_ONLY
        };
        let links = linkify(&doc, "", options).unwrap();
        assert_eq!(links, vec![link("bIds.$", id1), link("bIds.$", id2)]);
    }

    #[test]
    fn test_scalar_arrays_are_never_descended() {
        let doc = doc! { "tags": ["red", "blue"], "scores": [1, 2, 3] };
        let options = ExtractOptions {
            full_scan: true,
            identifier_arrays: true,
        };

        assert!(linkify(&doc, "", options).unwrap().is_empty());
    }

    #[test]
    fn test_full_scan_tracks_plain_fields() {
        let id1 = ObjectId::new();
        let doc = doc! {
            "_id": id1,
            "name": "widget",
            "price": 9.5,
            "stock": { "count": 3 },
            "deletedAt": null,
            "ownerId": id1,
        };
        let options = ExtractOptions {
            full_scan: true,
            ..IDS_ONLY
        };

        let links = sorted(linkify(&doc, "", options).unwrap());
        assert_eq!(
            links,
            sorted(vec![
                CandidateLink::presence("name"),
                CandidateLink::presence("price"),
                CandidateLink::presence("stock.count"),
                CandidateLink::presence("deletedAt"),
                link("ownerId", id1),
            ])
        );
    }

    #[test]
    fn test_prefix_is_applied() {
        let id1 = ObjectId::new();
        let doc = doc! { "ref": id1 };

        let links = linkify(&doc, "root", IDS_ONLY).unwrap();
        assert_eq!(links, vec![link("root.ref", id1)]);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let (id1, id2) = (ObjectId::new(), ObjectId::new());
        let doc = doc! { "a": id1, "b": { "c": id2 }, "d": [ { "e": id1 } ] };
        let options = ExtractOptions {
            full_scan: true,
            identifier_arrays: true,
        };

        let first = sorted(linkify(&doc, "", options).unwrap());
        let second = sorted(linkify(&doc, "", options).unwrap());
        assert_eq!(first, second);
    }
}
