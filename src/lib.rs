//! # Inferer
//!
//! Reference discovery for schemaless document stores.
//!
//! Collections in a document store rarely declare their relationships.
//! Inferer samples each collection, picks out values that look like
//! identifiers and checks which collections actually hold them, producing a
//! per-field estimate of "this path points into that collection".
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                DocumentStore (store)                     │
//! │  MongoStore | MemoryStore | WorkerDocumentStore (worker) │
//! └─────────────────────────────────────────────────────────┘
//!                          │ sample_collection
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │               Extractor (discover::extract)              │
//! │          documents -> candidate links (path, id)         │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [existence cache + probe permits]
//! ┌─────────────────────────────────────────────────────────┐
//! │                Matcher (discover::matcher)               │
//! │        race every target, first match wins              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                Reducer (discover::reduce)                │
//! │          path -> matched targets + confidence            │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod discover;
pub mod document;
pub mod store;
pub mod worker;

pub use discover::{
    AggregatedLink, CollectionLinks, DatabaseLinks, Discover, DiscoverConfig, DiscoverError,
    DiscoverResult, DiscoveryReport,
};
pub use document::{Document, ObjectId};
pub use store::{DocumentStore, MemoryStore, MongoStore, StoreError, WorkerDocumentStore};
