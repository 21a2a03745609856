//! Document store abstraction.
//!
//! The discovery engine never talks to a database directly. It goes through
//! [`DocumentStore`], which covers the four operations a scan needs.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                      DocumentStore                       │
//! │  - exists_by_id()        - list_databases()              │
//! │  - sample_collection()   - list_collections()            │
//! └──────────────────────────────────────────────────────────┘
//!          │                     │                     │
//!          ▼                     ▼                     ▼
//!      MongoStore       WorkerDocumentStore       MemoryStore
//!   (native driver)   (NDJSON worker process)  (tests, embedding)
//! ```

mod memory;
mod mongo;
mod worker_store;

use async_trait::async_trait;

use mongodb::error::ErrorKind;

use crate::document::{Document, DocumentError, ObjectId};
use crate::worker::WorkerError;

pub use memory::MemoryStore;
pub use mongo::MongoStore;
pub use worker_store::WorkerDocumentStore;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors surfaced by a store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error(transparent)]
    Worker(#[from] WorkerError),

    #[error("mongodb: {0}")]
    Mongo(#[from] mongodb::error::Error),

    /// The store returned a document that could not be decoded.
    #[error("undecodable document: {0}")]
    Document(#[from] DocumentError),
}

impl StoreError {
    /// Whether this is a connectivity failure rather than bad data.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Worker(e) => e.is_connectivity(),
            Self::Mongo(e) => matches!(
                *e.kind,
                ErrorKind::ServerSelection { .. }
                    | ErrorKind::Io(_)
                    | ErrorKind::ConnectionPoolCleared { .. }
                    | ErrorKind::DnsResolve { .. }
            ),
            Self::Document(_) => false,
        }
    }
}

/// Access to a document store.
///
/// Implementations must be cheap to call concurrently: a scan issues many
/// `exists_by_id` calls at once. A call whose future is dropped must not
/// leave the store in a bad state.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Whether `collection` in `database` holds a document with this `_id`.
    async fn exists_by_id(&self, database: &str, collection: &str, id: ObjectId)
        -> StoreResult<bool>;

    /// All database names, in store order.
    async fn list_databases(&self) -> StoreResult<Vec<String>>;

    /// All collection names of a database, in store order.
    async fn list_collections(&self, database: &str) -> StoreResult<Vec<String>>;

    /// Up to `size` randomly chosen documents.
    ///
    /// Returns fewer when the collection is smaller.
    async fn sample_collection(
        &self,
        database: &str,
        collection: &str,
        size: usize,
    ) -> StoreResult<Vec<Document>>;
}
