//! Async client for communicating with the storage worker process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};

use super::error::{WorkerError, WorkerResult};
use super::protocol::{
    methods, ConnectionParams, ErrorInfo, ExistsByIdParams, ExistsByIdResponse,
    ListCollectionsParams, ListCollectionsResponse, ListDatabasesParams, ListDatabasesResponse,
    RequestEnvelope, ResponseEnvelope, SampleCollectionParams, SampleCollectionResponse,
};
use crate::config::Settings;

/// Default timeout for requests (30 seconds).
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

type PendingMap = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseEnvelope>>>>;

/// Async client for the storage worker.
///
/// The client spawns the worker as a child process and communicates via
/// NDJSON (newline-delimited JSON) over stdin/stdout. Each request has a
/// unique ID for correlation with responses, so many probes can be in flight
/// at once over the single pipe.
///
/// # Example
///
/// ```ignore
/// use inferer::worker::WorkerClient;
///
/// let client = WorkerClient::spawn("./inferer-worker").await?;
/// let dbs = client.list_databases(&connection).await?;
/// ```
pub struct WorkerClient {
    /// Writer for sending requests to worker stdin.
    stdin: Arc<Mutex<BufWriter<ChildStdin>>>,

    /// Map of pending request IDs to response channels.
    pending: PendingMap,

    /// Handle to the worker child process.
    _child: Child,

    /// Handle to the background reader task.
    reader_task: tokio::task::JoinHandle<()>,

    /// Request timeout duration.
    timeout: Duration,
}

impl WorkerClient {
    /// Spawn a worker binary with the default timeout.
    pub async fn spawn<P: AsRef<Path>>(worker_path: P) -> WorkerResult<Self> {
        Self::spawn_with_args(worker_path, &[], Duration::from_secs(DEFAULT_TIMEOUT_SECS)).await
    }

    /// Spawn the worker described by settings.
    pub async fn spawn_with_settings(settings: &Settings) -> WorkerResult<Self> {
        let worker_path = Self::resolve_worker_path(settings)?;
        Self::spawn_with_args(
            &worker_path,
            &settings.worker.args,
            Duration::from_secs(settings.worker.timeout_secs),
        )
        .await
    }

    fn resolve_worker_path(settings: &Settings) -> WorkerResult<PathBuf> {
        settings.worker_path().ok_or_else(|| {
            WorkerError::SpawnFailed(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "worker binary not found; set worker.path in config or pass --worker",
            ))
        })
    }

    /// Spawn a worker with command-line arguments and a request timeout.
    pub async fn spawn_with_args<P: AsRef<Path>>(
        worker_path: P,
        args: &[String],
        timeout: Duration,
    ) -> WorkerResult<Self> {
        let mut child = Command::new(worker_path.as_ref())
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .map_err(WorkerError::SpawnFailed)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                return Err(WorkerError::SpawnFailed(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "worker stdio not captured",
                )))
            }
        };

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_task = Self::spawn_reader_task(stdout, pending.clone());

        tracing::debug!(worker = %worker_path.as_ref().display(), "spawned storage worker");

        Ok(Self {
            stdin: Arc::new(Mutex::new(BufWriter::new(stdin))),
            pending,
            _child: child,
            reader_task,
            timeout,
        })
    }

    /// Spawn the background task that reads responses from the worker.
    fn spawn_reader_task(stdout: ChildStdout, pending: PendingMap) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut reader = BufReader::new(stdout);
            let mut line = String::new();

            loop {
                line.clear();
                match reader.read_line(&mut line).await {
                    Ok(0) => break,
                    Ok(_) => match serde_json::from_str::<ResponseEnvelope>(&line) {
                        Ok(resp) => {
                            let mut pending = pending.lock().await;
                            // A missing entry means the caller timed out or was cancelled.
                            if let Some(tx) = pending.remove(&resp.id) {
                                let _ = tx.send(resp);
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "worker: failed to parse response");
                        }
                    },
                    Err(e) => {
                        tracing::error!(error = %e, "worker: read error");
                        break;
                    }
                }
            }

            // Worker exited - fail everything still waiting
            let mut pending = pending.lock().await;
            for (id, tx) in pending.drain() {
                let _ = tx.send(ResponseEnvelope {
                    id,
                    success: false,
                    result: None,
                    error: Some(ErrorInfo {
                        code: "WORKER_EXITED".to_string(),
                        message: "worker process exited unexpectedly".to_string(),
                    }),
                });
            }
        })
    }

    /// Send a request to the worker and wait for a response.
    ///
    /// Dropping the returned future abandons the request; a late response is
    /// discarded by the reader task.
    pub async fn request<P, R>(&self, method: &str, params: P) -> WorkerResult<R>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let id = uuid::Uuid::new_v4().to_string();

        let request = RequestEnvelope {
            id: id.clone(),
            method: method.to_string(),
            params: serde_json::to_value(params).map_err(WorkerError::SerializeFailed)?,
        };
        let line = serde_json::to_string(&request).map_err(WorkerError::SerializeFailed)? + "\n";

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id.clone(), tx);

        {
            let mut stdin = self.stdin.lock().await;
            let written = async {
                stdin.write_all(line.as_bytes()).await?;
                stdin.flush().await
            }
            .await;
            if let Err(e) = written {
                self.pending.lock().await.remove(&id);
                return Err(WorkerError::WriteFailed(e));
            }
        }

        let response = match tokio::time::timeout(self.timeout, rx).await {
            Ok(resp) => resp?,
            Err(_) => {
                self.pending.lock().await.remove(&id);
                return Err(WorkerError::Timeout(self.timeout.as_secs()));
            }
        };

        if response.success {
            let result = response.result.unwrap_or(serde_json::Value::Null);
            serde_json::from_value(result).map_err(WorkerError::DeserializeFailed)
        } else {
            let error = response.error.unwrap_or_else(|| ErrorInfo {
                code: "UNKNOWN".to_string(),
                message: "unknown error".to_string(),
            });
            Err(WorkerError::classify(&error.code, &error.message))
        }
    }

    /// Whether the worker's stdout is still open.
    pub fn is_alive(&self) -> bool {
        !self.reader_task.is_finished()
    }
}

// Typed wrappers for the store methods
impl WorkerClient {
    pub async fn list_databases(
        &self,
        connection: &ConnectionParams,
    ) -> WorkerResult<ListDatabasesResponse> {
        self.request(
            methods::LIST_DATABASES,
            ListDatabasesParams {
                connection: connection.clone(),
            },
        )
        .await
    }

    pub async fn list_collections(
        &self,
        connection: &ConnectionParams,
        database: &str,
    ) -> WorkerResult<ListCollectionsResponse> {
        self.request(
            methods::LIST_COLLECTIONS,
            ListCollectionsParams {
                connection: connection.clone(),
                database: database.to_string(),
            },
        )
        .await
    }

    pub async fn exists_by_id(
        &self,
        connection: &ConnectionParams,
        database: &str,
        collection: &str,
        id_hex: &str,
    ) -> WorkerResult<ExistsByIdResponse> {
        self.request(
            methods::EXISTS_BY_ID,
            ExistsByIdParams {
                connection: connection.clone(),
                database: database.to_string(),
                collection: collection.to_string(),
                id: id_hex.to_string(),
            },
        )
        .await
    }

    pub async fn sample_collection(
        &self,
        connection: &ConnectionParams,
        database: &str,
        collection: &str,
        size: usize,
    ) -> WorkerResult<SampleCollectionResponse> {
        self.request(
            methods::SAMPLE_COLLECTION,
            SampleCollectionParams {
                connection: connection.clone(),
                database: database.to_string(),
                collection: collection.to_string(),
                size,
            },
        )
        .await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn connection() -> ConnectionParams {
        ConnectionParams {
            driver: "mongodb".to_string(),
            connection_string: "mongodb://localhost:27017".to_string(),
        }
    }

    /// A stand-in worker: `sed` echoes each request id back with a fixed result.
    async fn sed_worker(result: &str) -> WorkerClient {
        let script = format!(
            r#"s/^{{"id":"\([^"]*\)".*$/{{"id":"\1","success":true,"result":{result}}}/"#
        );
        WorkerClient::spawn_with_args("sed", &["-u".to_string(), script], Duration::from_secs(5))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_request_roundtrip_through_child_process() {
        let client = sed_worker(r#"{"databases":["shop","admin"]}"#).await;
        assert!(client.is_alive());

        let resp = client.list_databases(&connection()).await.unwrap();
        assert_eq!(resp.databases, vec!["shop", "admin"]);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_correlated() {
        let client = sed_worker(r#"{"exists":true}"#).await;
        let conn = connection();

        let probes = (0..8).map(|i| {
            let conn = conn.clone();
            let client = &client;
            async move {
                client
                    .exists_by_id(&conn, "shop", &format!("c{i}"), "5f8d0d55b54764421b7156c9")
                    .await
            }
        });
        let results = futures::future::join_all(probes).await;
        assert!(results.into_iter().all(|r| r.unwrap().exists));
    }

    #[tokio::test]
    async fn test_missing_binary_fails_to_spawn() {
        let err = WorkerClient::spawn("/nonexistent/inferer-worker").await.err();
        assert!(matches!(err, Some(WorkerError::SpawnFailed(_))));
    }
}
