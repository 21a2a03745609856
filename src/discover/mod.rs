//! Reference discovery engine.
//!
//! Samples collections and decides, field path by field path, which other
//! collections the identifiers stored there point into.
//!
//! # Pipeline
//!
//! ```text
//!   scan_databases / scan_all
//!            │
//!            ▼
//!   scan_database ──── one task per collection (JoinSet)
//!            │
//!            ▼
//!   scan_collection
//!     sample_collection ─► linkify ─► Matcher ─► reduce_links
//!                           (per doc)  (per candidate, races all targets)
//! ```
//!
//! # Shared state
//!
//! One [`Discover`] owns the existence cache, the collection index and the
//! probe semaphore. Clones share all three, along with the root
//! cancellation scope.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use inferer::discover::{Discover, DiscoverConfig};
//! use inferer::store::MemoryStore;
//!
//! let engine = Discover::new(Arc::new(MemoryStore::new()), DiscoverConfig::default());
//! let links = engine.scan_database("shop").await?;
//! ```

pub mod cache;
mod error;
pub mod extract;
pub mod link;
pub mod matcher;
pub mod reduce;

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::document::Document;
use crate::store::DocumentStore;

use self::cache::{CollectionIndex, ExistenceCache};
use self::extract::{linkify, ExtractOptions};
use self::matcher::Matcher;
use self::reduce::reduce_links;

pub use self::error::{DiscoverError, DiscoverResult};
pub use self::link::{
    AggregatedLink, CandidateLink, CollectionLinks, DatabaseLinks, DiscoveryReport, ResolvedLink,
    Target, ARRAY_MARKER,
};

/// Documents drawn per collection unless configured otherwise.
pub const DEFAULT_SAMPLE_SIZE: usize = 10;

/// Existence probes allowed in flight at once unless configured otherwise.
pub const DEFAULT_MAX_CONCURRENT_PROBES: usize = 64;

/// Administrative databases that are never scanned nor matched against.
pub const DEFAULT_EXCLUDED_DATABASES: [&str; 4] = ["config", "system", "admin", "local"];

/// Engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverConfig {
    /// Documents sampled per collection.
    pub sample_size: usize,
    /// Also report presence of plain scalar fields.
    pub allow_full_scan: bool,
    /// Treat identifier elements of arrays as candidates (`field.$`).
    pub follow_identifier_arrays: bool,
    /// Upper bound on concurrent existence probes.
    pub max_concurrent_probes: usize,
    pub excluded_databases: Vec<String>,
}

impl Default for DiscoverConfig {
    fn default() -> Self {
        Self {
            sample_size: DEFAULT_SAMPLE_SIZE,
            allow_full_scan: false,
            follow_identifier_arrays: true,
            max_concurrent_probes: DEFAULT_MAX_CONCURRENT_PROBES,
            excluded_databases: DEFAULT_EXCLUDED_DATABASES
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl DiscoverConfig {
    pub fn with_sample_size(mut self, sample_size: usize) -> Self {
        self.sample_size = sample_size;
        self
    }

    pub fn with_full_scan(mut self, allow: bool) -> Self {
        self.allow_full_scan = allow;
        self
    }

    pub fn with_identifier_arrays(mut self, follow: bool) -> Self {
        self.follow_identifier_arrays = follow;
        self
    }

    /// Zero is raised to one.
    pub fn with_max_concurrent_probes(mut self, max: usize) -> Self {
        self.max_concurrent_probes = max.max(1);
        self
    }

    pub fn with_excluded_databases(mut self, databases: Vec<String>) -> Self {
        self.excluded_databases = databases;
        self
    }

    pub fn is_excluded(&self, database: &str) -> bool {
        self.excluded_databases.iter().any(|db| db == database)
    }

    pub fn extract_options(&self) -> ExtractOptions {
        ExtractOptions {
            full_scan: self.allow_full_scan,
            identifier_arrays: self.follow_identifier_arrays,
        }
    }
}

struct Shared {
    store: Arc<dyn DocumentStore>,
    config: DiscoverConfig,
    existence: ExistenceCache,
    index: CollectionIndex,
    permits: Semaphore,
    root: CancellationToken,
}

/// The discovery engine.
///
/// Cheap to clone; clones share caches, the probe semaphore and the root
/// cancellation scope.
#[derive(Clone)]
pub struct Discover {
    shared: Arc<Shared>,
}

impl Discover {
    pub fn new(store: Arc<dyn DocumentStore>, config: DiscoverConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent_probes.max(1));
        Self {
            shared: Arc::new(Shared {
                store,
                config,
                existence: ExistenceCache::new(),
                index: CollectionIndex::new(),
                permits,
                root: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &DiscoverConfig {
        &self.shared.config
    }

    /// Cancel every scan running on this engine or any of its clones.
    ///
    /// Scans started afterwards fail immediately with [`DiscoverError::Cancelled`].
    pub fn cancel(&self) {
        info!("cancelling discovery");
        self.shared.root.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.root.is_cancelled()
    }

    /// Number of memoized existence answers.
    pub async fn cached_probes(&self) -> usize {
        self.shared.existence.len().await
    }

    /// Scan one collection.
    pub async fn scan_collection(
        &self,
        database: &str,
        collection: &str,
    ) -> DiscoverResult<CollectionLinks> {
        let scope = self.shared.root.child_token();
        self.collection_in_scope(database, collection, &scope).await
    }

    /// Scan every collection of a database.
    ///
    /// A collection that fails is logged and left out of the result.
    pub async fn scan_database(&self, database: &str) -> DiscoverResult<DatabaseLinks> {
        if self.shared.config.is_excluded(database) {
            return Err(DiscoverError::ExcludedDatabase(database.to_string()));
        }

        let scope = self.shared.root.child_token();
        if scope.is_cancelled() {
            return Err(DiscoverError::Cancelled);
        }

        let collections = self
            .shared
            .index
            .collections(&*self.shared.store, database)
            .await
            .map_err(|source| {
                error!(database, error = %source, "failed to list collections");
                DiscoverError::ListCollections {
                    database: database.to_string(),
                    source,
                }
            })?;
        info!(database, collections = collections.len(), "scanning database");

        let mut tasks = JoinSet::new();
        for collection in collections.iter() {
            let engine = self.clone();
            let database = database.to_string();
            let collection = collection.clone();
            let scope = scope.clone();
            tasks.spawn(async move {
                let result = engine
                    .collection_in_scope(&database, &collection, &scope)
                    .await;
                (collection, result)
            });
        }

        let mut links = DatabaseLinks::new();
        loop {
            tokio::select! {
                biased;
                _ = scope.cancelled() => {
                    tasks.abort_all();
                    while tasks.join_next().await.is_some() {}
                    warn!(database, "database scan cancelled");
                    return Err(DiscoverError::Cancelled);
                }
                joined = tasks.join_next() => match joined {
                    None => break,
                    Some(Ok((collection, Ok(found)))) => {
                        links.insert(collection, found);
                    }
                    Some(Ok((collection, Err(err)))) => {
                        error!(database, collection = %collection, error = %err, "collection scan failed");
                    }
                    Some(Err(err)) => {
                        error!(database, error = %err, "collection task failed");
                    }
                },
            }
        }

        info!(database, collections = links.len(), "database scanned");
        Ok(links)
    }

    /// Scan several databases concurrently.
    ///
    /// Every requested name gets an entry; a database that fails to scan
    /// is logged and maps to an empty result.
    pub async fn scan_databases(&self, databases: &[String]) -> DiscoveryReport {
        let scans = databases.iter().map(|database| async move {
            let links = match self.scan_database(database).await {
                Ok(links) => links,
                Err(err) => {
                    error!(database = %database, error = %err, "database scan failed");
                    DatabaseLinks::new()
                }
            };
            (database.clone(), links)
        });
        join_all(scans).await.into_iter().collect::<BTreeMap<_, _>>()
    }

    /// Scan every database the store lists, minus the excluded ones.
    pub async fn scan_all(&self) -> DiscoverResult<DiscoveryReport> {
        let databases = self
            .shared
            .index
            .databases(&*self.shared.store)
            .await
            .map_err(|source| DiscoverError::ListDatabases { source })?;

        let selected: Vec<String> = databases
            .iter()
            .filter(|db| !self.shared.config.is_excluded(db))
            .cloned()
            .collect();
        debug!(
            total = databases.len(),
            selected = selected.len(),
            "selected databases"
        );

        Ok(self.scan_databases(&selected).await)
    }

    async fn collection_in_scope(
        &self,
        database: &str,
        collection: &str,
        scope: &CancellationToken,
    ) -> DiscoverResult<CollectionLinks> {
        let shared = &*self.shared;

        let sampled = tokio::select! {
            biased;
            _ = scope.cancelled() => return Err(DiscoverError::Cancelled),
            sampled = shared.store.sample_collection(database, collection, shared.config.sample_size) => sampled,
        };
        let samples = sampled.map_err(|source| DiscoverError::Sample {
            database: database.to_string(),
            collection: collection.to_string(),
            source,
        })?;

        let targets = shared
            .index
            .targets(&*shared.store, |db| shared.config.is_excluded(db))
            .await?;
        debug!(
            database,
            collection,
            samples = samples.len(),
            targets = targets.len(),
            "matching sample"
        );

        let matcher = Matcher::new(&*shared.store, &shared.existence, &shared.permits);
        let options = shared.config.extract_options();
        let resolved = join_all(samples.iter().map(|doc| {
            Self::resolve_document(doc, options, &matcher, &targets, scope, database, collection)
        }))
        .await;

        if scope.is_cancelled() {
            return Err(DiscoverError::Cancelled);
        }

        let links = reduce_links(&resolved);
        info!(
            database,
            collection,
            samples = resolved.len(),
            paths = links.len(),
            "collection scanned"
        );
        Ok(links)
    }

    /// Extract and match one sampled document; failures yield an empty set.
    async fn resolve_document(
        doc: &Document,
        options: ExtractOptions,
        matcher: &Matcher<'_>,
        targets: &[Target],
        scope: &CancellationToken,
        database: &str,
        collection: &str,
    ) -> Vec<ResolvedLink> {
        let candidates = match linkify(doc, "", options) {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(database, collection, error = %err, "skipping document: extraction failed");
                return Vec::new();
            }
        };

        match matcher.match_all(candidates, targets, scope).await {
            Ok(resolved) => resolved,
            Err(DiscoverError::Cancelled) => Vec::new(),
            Err(err) => {
                warn!(database, collection, error = %err, "skipping document: matching failed");
                Vec::new()
            }
        }
    }
}
