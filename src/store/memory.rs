//! In-memory document store.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::IndexedRandom;
use tokio::sync::RwLock;

use super::{DocumentStore, StoreError, StoreResult};
use crate::document::{document_id, Document, ObjectId};

type Collections = BTreeMap<String, Vec<Document>>;

/// A [`DocumentStore`] backed by plain maps.
///
/// Databases and collections are listed in name order. Failures and probe
/// latency can be injected to exercise the engine's error and cancellation
/// paths.
#[derive(Debug, Default)]
pub struct MemoryStore {
    databases: RwLock<BTreeMap<String, Collections>>,
    unavailable: HashSet<(String, Option<String>)>,
    probe_delay: Option<Duration>,
    exists_calls: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: add documents to a collection, creating it if needed.
    pub fn with_documents(
        mut self,
        database: &str,
        collection: &str,
        docs: impl IntoIterator<Item = Document>,
    ) -> Self {
        self.databases
            .get_mut()
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .extend(docs);
        self
    }

    /// Builder: every call touching `database` fails.
    pub fn with_unavailable_database(mut self, database: &str) -> Self {
        self.unavailable.insert((database.to_string(), None));
        self
    }

    /// Builder: sampling and probing `database.collection` fails.
    pub fn with_unavailable_collection(mut self, database: &str, collection: &str) -> Self {
        self.unavailable
            .insert((database.to_string(), Some(collection.to_string())));
        self
    }

    /// Builder: delay every `exists_by_id` answer.
    pub fn with_probe_delay(mut self, delay: Duration) -> Self {
        self.probe_delay = Some(delay);
        self
    }

    /// Insert a document into a collection, creating it if needed.
    pub async fn insert(&self, database: &str, collection: &str, doc: Document) {
        self.databases
            .write()
            .await
            .entry(database.to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .push(doc);
    }

    /// Number of `exists_by_id` calls that reached the store.
    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    fn check_available(&self, database: &str, collection: Option<&str>) -> StoreResult<()> {
        let db_down = self.unavailable.contains(&(database.to_string(), None));
        let coll_down = collection.is_some_and(|c| {
            self.unavailable
                .contains(&(database.to_string(), Some(c.to_string())))
        });
        if db_down || coll_down {
            let target = match collection {
                Some(c) => format!("{database}.{c}"),
                None => database.to_string(),
            };
            return Err(StoreError::Unavailable(format!("{target} is unreachable")));
        }
        Ok(())
    }
}

fn sample(docs: &[Document], size: usize) -> Vec<Document> {
    let mut rng = rand::rng();
    docs.choose_multiple(&mut rng, size).cloned().collect()
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn exists_by_id(
        &self,
        database: &str,
        collection: &str,
        id: ObjectId,
    ) -> StoreResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.probe_delay {
            tokio::time::sleep(delay).await;
        }
        self.check_available(database, Some(collection))?;

        let databases = self.databases.read().await;
        Ok(databases
            .get(database)
            .and_then(|colls| colls.get(collection))
            .is_some_and(|docs| docs.iter().any(|d| document_id(d) == Some(id))))
    }

    async fn list_databases(&self) -> StoreResult<Vec<String>> {
        Ok(self.databases.read().await.keys().cloned().collect())
    }

    async fn list_collections(&self, database: &str) -> StoreResult<Vec<String>> {
        self.check_available(database, None)?;
        Ok(self
            .databases
            .read()
            .await
            .get(database)
            .map(|colls| colls.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn sample_collection(
        &self,
        database: &str,
        collection: &str,
        size: usize,
    ) -> StoreResult<Vec<Document>> {
        self.check_available(database, Some(collection))?;
        let databases = self.databases.read().await;
        Ok(databases
            .get(database)
            .and_then(|colls| colls.get(collection))
            .map(|docs| sample(docs, size))
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc;

    fn doc_with_id(id: ObjectId) -> Document {
        doc! { "_id": id }
    }

    #[tokio::test]
    async fn test_exists_by_id() {
        let id = ObjectId::new();
        let store = MemoryStore::new().with_documents("shop", "orders", [doc_with_id(id)]);

        assert!(store.exists_by_id("shop", "orders", id).await.unwrap());
        assert!(!store.exists_by_id("shop", "users", id).await.unwrap());
        assert!(!store
            .exists_by_id("shop", "orders", ObjectId::new())
            .await
            .unwrap());
        assert_eq!(store.exists_calls(), 3);
    }

    #[tokio::test]
    async fn test_sample_is_bounded_by_collection_size() {
        let docs: Vec<_> = (0..5).map(|_| doc_with_id(ObjectId::new())).collect();
        let store = MemoryStore::new().with_documents("shop", "orders", docs);

        assert_eq!(store.sample_collection("shop", "orders", 3).await.unwrap().len(), 3);
        assert_eq!(store.sample_collection("shop", "orders", 10).await.unwrap().len(), 5);
        assert!(store.sample_collection("shop", "missing", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sample_has_no_duplicates() {
        let docs: Vec<_> = (0..20).map(|_| doc_with_id(ObjectId::new())).collect();
        let store = MemoryStore::new().with_documents("shop", "orders", docs);

        let sampled = store.sample_collection("shop", "orders", 20).await.unwrap();
        let ids: HashSet<_> = sampled.iter().filter_map(document_id).collect();
        assert_eq!(ids.len(), 20);
    }

    #[tokio::test]
    async fn test_listing_is_name_ordered() {
        let store = MemoryStore::new()
            .with_documents("b", "y", [])
            .with_documents("a", "z", [])
            .with_documents("a", "x", []);
        store.insert("c", "w", Document::new()).await;

        assert_eq!(store.list_databases().await.unwrap(), vec!["a", "b", "c"]);
        assert_eq!(store.list_collections("a").await.unwrap(), vec!["x", "z"]);
    }

    #[tokio::test]
    async fn test_unavailable_collection() {
        let store = MemoryStore::new()
            .with_documents("shop", "orders", [])
            .with_unavailable_collection("shop", "orders");

        let err = store.sample_collection("shop", "orders", 5).await.unwrap_err();
        assert!(err.is_connectivity());
        assert!(store.exists_by_id("shop", "orders", ObjectId::new()).await.is_err());
        assert!(store.list_collections("shop").await.is_ok());
    }
}
