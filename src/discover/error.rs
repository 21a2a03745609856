//! Discovery error types.

use thiserror::Error;

use crate::document::DocumentError;
use crate::store::StoreError;

/// Result type for discovery operations.
pub type DiscoverResult<T> = Result<T, DiscoverError>;

/// Errors raised while scanning.
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("failed to list databases: {source}")]
    ListDatabases {
        #[source]
        source: StoreError,
    },

    #[error("failed to list collections of {database}: {source}")]
    ListCollections {
        database: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to sample {database}.{collection}: {source}")]
    Sample {
        database: String,
        collection: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to look up {id} in {database}.{collection}: {source}")]
    Probe {
        database: String,
        collection: String,
        id: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to extract links: {0}")]
    Extract(#[from] DocumentError),

    #[error("database {0} is excluded from discovery")]
    ExcludedDatabase(String),

    #[error("discovery cancelled")]
    Cancelled,
}

impl DiscoverError {
    /// Whether the underlying cause is the store being unreachable.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Self::ListDatabases { source }
            | Self::ListCollections { source, .. }
            | Self::Sample { source, .. }
            | Self::Probe { source, .. } => source.is_connectivity(),
            _ => false,
        }
    }
}
