//! Run-scoped memo caches.
//!
//! Both caches live exactly as long as one [`Discover`](super::Discover)
//! engine. Entries are written once and never invalidated: the store is
//! assumed stable for the duration of a run.
//!
//! # Key Format
//!
//! ```text
//! ExistenceCache:   (database, collection, ObjectId) -> bool
//! CollectionIndex:  database                         -> [collection, ...]
//!                   (database list)                  -> [database, ...]
//! ```

use std::collections::HashMap;
use std::future::Future;
use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{OnceCell, RwLock};

use super::error::{DiscoverError, DiscoverResult};
use super::link::Target;
use crate::document::ObjectId;
use crate::store::{DocumentStore, StoreResult};

/// A concurrent get-or-compute map behind a reader/writer lock.
///
/// Lookups share the read lock. On a miss the compute future runs without
/// holding any lock and its result is stored under the write lock; if a
/// concurrent miss stored the key first, that value wins and is returned.
/// Errors are not cached, and a compute whose future is dropped stores nothing.
#[derive(Debug)]
pub struct MemoCache<K, V> {
    entries: RwLock<HashMap<K, V>>,
}

impl<K, V> Default for MemoCache<K, V> {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl<K, V> MemoCache<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, key: &K) -> Option<V> {
        self.entries.read().await.get(key).cloned()
    }

    pub async fn get_or_try_compute<F, Fut, E>(&self, key: K, compute: F) -> Result<V, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, E>>,
    {
        if let Some(value) = self.entries.read().await.get(&key) {
            return Ok(value.clone());
        }

        let value = compute().await?;
        let mut entries = self.entries.write().await;
        Ok(entries.entry(key).or_insert(value).clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

/// Memoized "does this identifier exist in that collection" answers.
#[derive(Debug, Default)]
pub struct ExistenceCache {
    inner: MemoCache<(Target, ObjectId), bool>,
}

impl ExistenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached answer, if any.
    pub async fn lookup(&self, target: &Target, id: ObjectId) -> Option<bool> {
        self.inner.get(&(target.clone(), id)).await
    }

    /// Cached answer, or run `probe` and remember what it says.
    pub async fn get_or_probe<F, Fut>(&self, target: &Target, id: ObjectId, probe: F) -> StoreResult<bool>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = StoreResult<bool>>,
    {
        self.inner
            .get_or_try_compute((target.clone(), id), probe)
            .await
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }
}

/// Memoized database and collection listings.
#[derive(Debug, Default)]
pub struct CollectionIndex {
    databases: OnceCell<Arc<Vec<String>>>,
    collections: MemoCache<String, Arc<Vec<String>>>,
}

impl CollectionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn databases(&self, store: &dyn DocumentStore) -> StoreResult<Arc<Vec<String>>> {
        self.databases
            .get_or_try_init(|| async { store.list_databases().await.map(Arc::new) })
            .await
            .cloned()
    }

    pub async fn collections(
        &self,
        store: &dyn DocumentStore,
        database: &str,
    ) -> StoreResult<Arc<Vec<String>>> {
        self.collections
            .get_or_try_compute(database.to_string(), || async {
                store.list_collections(database).await.map(Arc::new)
            })
            .await
    }

    /// Every (database, collection) pair outside the excluded databases.
    ///
    /// Failing to list databases is an error. A database whose collections
    /// cannot be listed is logged and contributes no targets.
    pub async fn targets(
        &self,
        store: &dyn DocumentStore,
        is_excluded: impl Fn(&str) -> bool,
    ) -> DiscoverResult<Vec<Target>> {
        let databases = self
            .databases(store)
            .await
            .map_err(|source| DiscoverError::ListDatabases { source })?;

        let mut targets = Vec::new();
        for database in databases.iter().filter(|db| !is_excluded(db)) {
            let collections = match self.collections(store, database).await {
                Ok(collections) => collections,
                Err(err) => {
                    tracing::warn!(database = %database, error = %err, "skipping database as match target");
                    continue;
                }
            };
            for collection in collections.iter() {
                targets.push(Target::new(database.as_str(), collection.as_str()));
            }
        }
        Ok(targets)
    }

    /// Number of databases whose collections are cached.
    pub async fn cached_databases(&self) -> usize {
        self.collections.len().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::doc;
    use crate::store::{MemoryStore, StoreError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_memo_cache_computes_once() {
        let cache: MemoCache<&str, usize> = MemoCache::new();
        let calls = AtomicUsize::new(0);

        for _ in 0..3 {
            let value = cache
                .get_or_try_compute("k", || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, ()>(7)
                })
                .await
                .unwrap();
            assert_eq!(value, 7);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_memo_cache_does_not_store_errors() {
        let cache: MemoCache<&str, usize> = MemoCache::new();

        let err = cache
            .get_or_try_compute("k", || async { Err::<usize, _>("boom") })
            .await;
        assert_eq!(err, Err("boom"));
        assert!(cache.is_empty().await);

        let ok = cache
            .get_or_try_compute("k", || async { Ok::<_, &str>(1) })
            .await;
        assert_eq!(ok, Ok(1));
    }

    #[tokio::test]
    async fn test_memo_cache_first_write_wins() {
        let cache: MemoCache<&str, usize> = MemoCache::new();
        let (a, b) = tokio::join!(
            cache.get_or_try_compute("k", || async {
                tokio::task::yield_now().await;
                Ok::<_, ()>(1)
            }),
            cache.get_or_try_compute("k", || async { Ok::<_, ()>(2) }),
        );

        // Both callers see the single stored value
        assert_eq!(a, b);
        assert_eq!(cache.get(&"k").await, a.ok());
    }

    #[tokio::test]
    async fn test_existence_cache_skips_store_on_hit() {
        let id = ObjectId::new();
        let store = MemoryStore::new().with_documents("shop", "users", [doc! { "_id": id }]);
        let cache = ExistenceCache::new();
        let target = Target::new("shop", "users");

        for _ in 0..4 {
            let found = cache
                .get_or_probe(&target, id, || store.exists_by_id("shop", "users", id))
                .await
                .unwrap();
            assert!(found);
        }
        assert_eq!(store.exists_calls(), 1);
        assert_eq!(cache.lookup(&target, id).await, Some(true));
        assert_eq!(cache.lookup(&Target::new("shop", "orders"), id).await, None);
    }

    #[tokio::test]
    async fn test_targets_skip_excluded_databases() {
        let store = MemoryStore::new()
            .with_documents("admin", "users", [])
            .with_documents("shop", "orders", [])
            .with_documents("shop", "users", []);
        let index = CollectionIndex::new();

        let targets = index.targets(&store, |db| db == "admin").await.unwrap();
        assert_eq!(
            targets,
            vec![Target::new("shop", "orders"), Target::new("shop", "users")]
        );
        assert_eq!(index.cached_databases().await, 1);
    }

    #[tokio::test]
    async fn test_targets_skip_unlistable_databases() {
        let store = MemoryStore::new()
            .with_documents("down", "orders", [])
            .with_documents("shop", "users", [])
            .with_unavailable_database("down");
        let index = CollectionIndex::new();

        let targets = index.targets(&store, |_| false).await.unwrap();
        assert_eq!(targets, vec![Target::new("shop", "users")]);

        // The failed listing is not cached
        let err = index.collections(&store, "down").await.unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(index.cached_databases().await, 1);
    }
}
