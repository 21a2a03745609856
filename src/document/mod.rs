//! Schemaless documents as seen by the scanner.
//!
//! Documents are BSON documents. They arrive from a store either natively
//! (MongoDB, in-memory store) or as relaxed Extended JSON (worker store),
//! which [`from_extended_json`] turns into the same [`Document`] with field
//! order preserved.

use mongodb::bson::Bson;

pub use mongodb::bson::oid::ObjectId;
pub use mongodb::bson::{doc, Document};

/// Primary key field, never treated as a reference.
pub const PRIMARY_KEY: &str = "_id";

/// Length of an identifier in its hex form.
pub const OBJECT_ID_HEX_LEN: usize = 24;

/// Result type for document decoding.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Errors raised while decoding documents or identifiers.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DocumentError {
    #[error("invalid ObjectId: {0:?}")]
    InvalidObjectId(String),

    #[error("invalid extended JSON: {0}")]
    InvalidExtendedJson(String),

    #[error("expected a document, got {0}")]
    NotADocument(String),
}

/// Whether `s` has the shape of a hex-encoded identifier.
pub fn looks_like_object_id(s: &str) -> bool {
    s.len() == OBJECT_ID_HEX_LEN && s.bytes().all(|b| b.is_ascii_hexdigit())
}

pub fn parse_object_id(s: &str) -> DocumentResult<ObjectId> {
    ObjectId::parse_str(s).map_err(|_| DocumentError::InvalidObjectId(s.to_string()))
}

/// The document's `_id`, whether stored natively or as a hex string.
pub fn document_id(doc: &Document) -> Option<ObjectId> {
    match doc.get(PRIMARY_KEY)? {
        Bson::ObjectId(id) => Some(*id),
        Bson::String(s) => ObjectId::parse_str(s).ok(),
        _ => None,
    }
}

/// Decode one relaxed or canonical Extended JSON object.
pub fn from_extended_json(json: serde_json::Value) -> DocumentResult<Document> {
    let bson = Bson::try_from(json)
        .map_err(|e| DocumentError::InvalidExtendedJson(e.to_string()))?;
    match bson {
        Bson::Document(doc) => Ok(doc),
        other => Err(DocumentError::NotADocument(format!("{:?}", other.element_type()))),
    }
}
