//! Protocol types for storage worker communication.
//!
//! One JSON object per line in each direction. Requests carry the connection
//! parameters so a single worker can serve several stores.

use serde::{Deserialize, Serialize};

// ============================================================================
// Request/Response Envelope
// ============================================================================

/// Request envelope sent to the worker.
#[derive(Debug, Clone, Serialize)]
pub struct RequestEnvelope {
    /// Unique request ID for correlation.
    pub id: String,
    /// Method name (e.g., "store.list_databases").
    pub method: String,
    /// Method-specific parameters.
    pub params: serde_json::Value,
}

/// Response envelope received from the worker.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    /// Request ID this response corresponds to.
    pub id: String,
    /// Whether the request succeeded.
    pub success: bool,
    /// Result data (present if success = true).
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error information (present if success = false).
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

/// Error information in a failed response.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

// ============================================================================
// Connection Parameters (included in all requests)
// ============================================================================

/// Store connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionParams {
    /// Store driver name (e.g., "mongodb").
    pub driver: String,
    /// Driver-specific connection string.
    pub connection_string: String,
}

// ============================================================================
// Store Request Parameters
// ============================================================================

/// Parameters for `store.list_databases`.
#[derive(Debug, Clone, Serialize)]
pub struct ListDatabasesParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
}

/// Parameters for `store.list_collections`.
#[derive(Debug, Clone, Serialize)]
pub struct ListCollectionsParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub database: String,
}

/// Parameters for `store.exists_by_id`.
#[derive(Debug, Clone, Serialize)]
pub struct ExistsByIdParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub database: String,
    pub collection: String,
    /// Identifier in hex form.
    pub id: String,
}

/// Parameters for `store.sample_collection`.
#[derive(Debug, Clone, Serialize)]
pub struct SampleCollectionParams {
    #[serde(flatten)]
    pub connection: ConnectionParams,
    pub database: String,
    pub collection: String,
    pub size: usize,
}

// ============================================================================
// Store Responses
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ListDatabasesResponse {
    pub databases: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListCollectionsResponse {
    pub collections: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExistsByIdResponse {
    pub exists: bool,
}

/// Sampled documents as relaxed Extended JSON.
#[derive(Debug, Clone, Deserialize)]
pub struct SampleCollectionResponse {
    #[serde(default)]
    pub documents: Vec<serde_json::Value>,
}

/// Method names understood by the worker.
pub mod methods {
    pub const LIST_DATABASES: &str = "store.list_databases";
    pub const LIST_COLLECTIONS: &str = "store.list_collections";
    pub const EXISTS_BY_ID: &str = "store.exists_by_id";
    pub const SAMPLE_COLLECTION: &str = "store.sample_collection";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connection_params_are_flattened() {
        let params = ExistsByIdParams {
            connection: ConnectionParams {
                driver: "mongodb".to_string(),
                connection_string: "mongodb://localhost:27017".to_string(),
            },
            database: "shop".to_string(),
            collection: "orders".to_string(),
            id: "5f8d0d55b54764421b7156c9".to_string(),
        };

        let value = serde_json::to_value(params).unwrap();
        assert_eq!(
            value,
            json!({
                "driver": "mongodb",
                "connection_string": "mongodb://localhost:27017",
                "database": "shop",
                "collection": "orders",
                "id": "5f8d0d55b54764421b7156c9"
            })
        );
    }

    #[test]
    fn test_error_response_deserializes() {
        let line = r#"{"id":"1","success":false,"error":{"code":"CONNECTION_FAILED","message":"refused"}}"#;
        let resp: ResponseEnvelope = serde_json::from_str(line).unwrap();
        assert!(!resp.success);
        assert!(resp.result.is_none());
        assert_eq!(resp.error.unwrap().code, "CONNECTION_FAILED");
    }

    #[test]
    fn test_sample_response_defaults_to_empty() {
        let resp: SampleCollectionResponse = serde_json::from_value(json!({})).unwrap();
        assert!(resp.documents.is_empty());
    }
}
