//! DocumentStore implementation over the storage worker.

use std::sync::Arc;

use async_trait::async_trait;

use super::{DocumentStore, StoreResult};
use crate::document::{from_extended_json, Document, ObjectId};
use crate::worker::protocol::ConnectionParams;
use crate::worker::WorkerClient;

/// [`DocumentStore`] that forwards every call to a [`WorkerClient`].
///
/// # Example
///
/// ```ignore
/// use inferer::store::WorkerDocumentStore;
/// use inferer::worker::WorkerClient;
///
/// let client = WorkerClient::spawn("./inferer-worker").await?;
/// let store = WorkerDocumentStore::with_client(client, "mongodb", "mongodb://localhost:27017");
/// let dbs = store.list_databases().await?;
/// ```
pub struct WorkerDocumentStore {
    client: Arc<WorkerClient>,
    connection: ConnectionParams,
}

impl WorkerDocumentStore {
    pub fn new(client: Arc<WorkerClient>, connection: ConnectionParams) -> Self {
        Self { client, connection }
    }

    /// Convenience constructor taking an owned client.
    pub fn with_client(
        client: WorkerClient,
        driver: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        Self::new(
            Arc::new(client),
            ConnectionParams {
                driver: driver.into(),
                connection_string: connection_string.into(),
            },
        )
    }
}

#[async_trait]
impl DocumentStore for WorkerDocumentStore {
    async fn exists_by_id(
        &self,
        database: &str,
        collection: &str,
        id: ObjectId,
    ) -> StoreResult<bool> {
        let resp = self
            .client
            .exists_by_id(&self.connection, database, collection, &id.to_hex())
            .await?;
        Ok(resp.exists)
    }

    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        Ok(self.client.list_databases(&self.connection).await?.databases)
    }

    async fn list_collections(&self, database: &str) -> StoreResult<Vec<String>> {
        Ok(self
            .client
            .list_collections(&self.connection, database)
            .await?
            .collections)
    }

    async fn sample_collection(
        &self,
        database: &str,
        collection: &str,
        size: usize,
    ) -> StoreResult<Vec<Document>> {
        let resp = self
            .client
            .sample_collection(&self.connection, database, collection, size)
            .await?;

        let docs = resp
            .documents
            .into_iter()
            .map(from_extended_json)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(docs)
    }
}
