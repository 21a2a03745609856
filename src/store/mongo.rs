//! DocumentStore implementation over the native MongoDB driver.

use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::Client;
use tracing::debug;

use super::{DocumentStore, StoreResult};
use crate::document::{doc, Document, ObjectId};

/// [`DocumentStore`] backed by a [`mongodb::Client`].
///
/// The client pools connections internally, so one store serves every
/// concurrent lookup of a scan. Dropping an in-flight call abandons the
/// operation, which is how scan cancellation reaches the driver.
#[derive(Clone)]
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    /// Parse `uri` and build a client. Servers are contacted lazily.
    pub async fn connect(uri: &str) -> StoreResult<Self> {
        let client = Client::with_uri_str(uri).await?;
        debug!("mongodb client ready");
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DocumentStore for MongoStore {
    async fn exists_by_id(
        &self,
        database: &str,
        collection: &str,
        id: ObjectId,
    ) -> StoreResult<bool> {
        let found = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .find_one(doc! { "_id": id })
            .projection(doc! { "_id": 1 })
            .await?;
        Ok(found.is_some())
    }

    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        Ok(self.client.list_database_names().await?)
    }

    async fn list_collections(&self, database: &str) -> StoreResult<Vec<String>> {
        Ok(self.client.database(database).list_collection_names().await?)
    }

    async fn sample_collection(
        &self,
        database: &str,
        collection: &str,
        size: usize,
    ) -> StoreResult<Vec<Document>> {
        let pipeline = vec![doc! { "$sample": { "size": size as i64 } }];
        let cursor = self
            .client
            .database(database)
            .collection::<Document>(collection)
            .aggregate(pipeline)
            .allow_disk_use(true)
            .await?;
        let docs: Vec<Document> = cursor.try_collect().await?;
        debug!(database, collection, sampled = docs.len(), "sampled collection");
        Ok(docs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    #[tokio::test]
    async fn test_connect_rejects_malformed_uri() {
        let err = MongoStore::connect("http://localhost:27017").await.err().unwrap();
        assert!(matches!(err, StoreError::Mongo(_)));
        assert!(!err.is_connectivity());
    }

    /// Needs a running server: `MONGO_URI=mongodb://localhost:27017 cargo test -- --ignored`
    #[tokio::test]
    #[ignore]
    async fn test_live_server_round_trip() {
        let uri = std::env::var("MONGO_URI").unwrap();
        let store = MongoStore::connect(&uri).await.unwrap();

        let db = format!("inferer-mongo-test-{}", ObjectId::new().to_hex());
        let coll = store.client.database(&db).collection::<Document>("A");
        let ids: Vec<ObjectId> = (0..5).map(|_| ObjectId::new()).collect();
        coll.insert_many(ids.iter().map(|id| doc! { "_id": *id, "n": 1 }))
            .await
            .unwrap();

        assert!(store.exists_by_id(&db, "A", ids[0]).await.unwrap());
        assert!(!store.exists_by_id(&db, "A", ObjectId::new()).await.unwrap());
        assert!(store.list_databases().await.unwrap().contains(&db));
        assert_eq!(store.list_collections(&db).await.unwrap(), vec!["A"]);

        let sampled = store.sample_collection(&db, "A", 3).await.unwrap();
        assert_eq!(sampled.len(), 3);
        let bigger = store.sample_collection(&db, "A", 50).await.unwrap();
        assert_eq!(bigger.len(), 5);

        store.client.database(&db).drop().await.unwrap();
    }
}
