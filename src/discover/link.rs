//! Link types flowing through a scan.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Path segment standing for "any index" of an array.
pub const ARRAY_MARKER: &str = "$";

/// A (database, collection) pair an identifier was found in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Target {
    pub database: String,
    pub collection: String,
}

impl Target {
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// A field path suspected of holding a reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateLink {
    pub path: String,
    /// Identifier hex; empty for plain fields tracked in full-scan mode.
    pub value: String,
}

impl CandidateLink {
    pub fn new(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            value: value.into(),
        }
    }

    /// A plain field tracked for presence only.
    pub fn presence(path: impl Into<String>) -> Self {
        Self::new(path, String::new())
    }

    pub fn is_presence(&self) -> bool {
        self.value.is_empty()
    }
}

/// A candidate after matching, with the `database.collection` targets it resolved to.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLink {
    pub candidate: CandidateLink,
    pub matched_targets: Vec<String>,
}

impl ResolvedLink {
    pub fn unmatched(candidate: CandidateLink) -> Self {
        Self {
            candidate,
            matched_targets: Vec::new(),
        }
    }

    /// Add a target unless it is already present.
    pub fn push_target(&mut self, target: impl Into<String>) {
        let target = target.into();
        if !self.matched_targets.contains(&target) {
            self.matched_targets.push(target);
        }
    }

    pub fn path(&self) -> &str {
        &self.candidate.path
    }
}

/// Per-path statistics over one collection sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedLink {
    pub path: String,
    pub matched_targets: Vec<String>,
    /// Share of sampled documents holding the path, in `[0, 1]`.
    pub confidence: f64,
}

/// Path → statistics for one collection.
pub type CollectionLinks = BTreeMap<String, AggregatedLink>;

/// Collection name → links for one database.
pub type DatabaseLinks = BTreeMap<String, CollectionLinks>;

/// Database name → links, the output of a multi-database scan.
pub type DiscoveryReport = BTreeMap<String, DatabaseLinks>;
