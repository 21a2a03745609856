//! Candidate matching: which collection does an identifier point into?
//!
//! Every candidate is raced against all known targets. Probes run
//! concurrently; the first probe to find the identifier commits its target
//! into a single-slot channel and cancels the rest of the race. Later
//! winners are dropped, so a candidate resolves to at most one target even
//! when several collections hold the same identifier. Which one wins in that
//! case depends on probe timing and is not deterministic.

use futures::future::join_all;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;

use super::cache::ExistenceCache;
use super::error::{DiscoverError, DiscoverResult};
use super::link::{CandidateLink, ResolvedLink, Target};
use crate::document::{parse_object_id, ObjectId};
use crate::store::{DocumentStore, StoreError, StoreResult};

/// Resolves candidates against the store through the existence cache.
///
/// Probes that miss the cache share `permits`, which caps how many
/// existence checks are in flight across the whole run.
pub struct Matcher<'a> {
    store: &'a dyn DocumentStore,
    existence: &'a ExistenceCache,
    permits: &'a Semaphore,
}

impl<'a> Matcher<'a> {
    pub fn new(
        store: &'a dyn DocumentStore,
        existence: &'a ExistenceCache,
        permits: &'a Semaphore,
    ) -> Self {
        Self {
            store,
            existence,
            permits,
        }
    }

    /// Resolve one candidate.
    ///
    /// Returns `Ok(None)` when no target holds the identifier. Presence-only
    /// candidates resolve immediately with no target. If nothing matched and
    /// a probe failed, the probe error is returned.
    pub async fn match_candidate(
        &self,
        candidate: CandidateLink,
        targets: &[Target],
        scope: &CancellationToken,
    ) -> DiscoverResult<Option<ResolvedLink>> {
        if candidate.is_presence() {
            return Ok(Some(ResolvedLink::unmatched(candidate)));
        }
        let id = parse_object_id(&candidate.value)?;

        let race = scope.child_token();
        let (slot, mut winner) = mpsc::channel::<Target>(1);

        let probes = targets.iter().map(|target| {
            let slot = slot.clone();
            let race = &race;
            async move {
                let found = tokio::select! {
                    biased;
                    _ = race.cancelled() => return Ok(()),
                    found = self.probe(target, id) => found,
                };

                match found {
                    Ok(true) => {
                        if slot.try_send(target.clone()).is_ok() {
                            race.cancel();
                        } else {
                            tracing::debug!(%target, %id, "late match dropped");
                        }
                        Ok(())
                    }
                    Ok(false) => Ok(()),
                    Err(source) => {
                        tracing::warn!(
                            database = %target.database,
                            collection = %target.collection,
                            %id,
                            error = %source,
                            "existence probe failed"
                        );
                        Err(DiscoverError::Probe {
                            database: target.database.clone(),
                            collection: target.collection.clone(),
                            id: id.to_hex(),
                            source,
                        })
                    }
                }
            }
        });
        let outcomes = join_all(probes).await;
        drop(slot);

        if let Ok(target) = winner.try_recv() {
            let mut resolved = ResolvedLink::unmatched(candidate);
            resolved.push_target(target.to_string());
            return Ok(Some(resolved));
        }

        if scope.is_cancelled() {
            return Err(DiscoverError::Cancelled);
        }
        if let Some(err) = outcomes.into_iter().find_map(Result::err) {
            return Err(err);
        }

        tracing::debug!(path = %candidate.path, %id, "unresolved candidate");
        Ok(None)
    }

    /// Resolve all candidates of one document concurrently, keeping the matched ones.
    pub async fn match_all(
        &self,
        candidates: Vec<CandidateLink>,
        targets: &[Target],
        scope: &CancellationToken,
    ) -> DiscoverResult<Vec<ResolvedLink>> {
        let results = join_all(
            candidates
                .into_iter()
                .map(|candidate| self.match_candidate(candidate, targets, scope)),
        )
        .await;

        let mut resolved = Vec::new();
        for result in results {
            if let Some(link) = result? {
                resolved.push(link);
            }
        }
        Ok(resolved)
    }

    async fn probe(&self, target: &Target, id: ObjectId) -> StoreResult<bool> {
        self.existence
            .get_or_probe(target, id, || async {
                let _permit = self
                    .permits
                    .acquire()
                    .await
                    .map_err(|_| StoreError::Unavailable("probe pool closed".to_string()))?;
                self.store
                    .exists_by_id(&target.database, &target.collection, id)
                    .await
            })
            .await
    }
}
