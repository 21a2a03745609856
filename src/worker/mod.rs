//! Storage worker communication.
//!
//! Store access lives in a separate long-running worker process that owns
//! the database driver. The Rust side only speaks a small NDJSON protocol,
//! which keeps the engine driver-agnostic.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    inferer (Rust + Tokio)                       │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                    WorkerClient (Async)                   │  │
//! │  │  - Spawns the worker as a child process                   │  │
//! │  │  - NDJSON protocol over stdin/stdout                      │  │
//! │  │  - Request IDs for concurrent request correlation         │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │               stdin (NDJSON) │ stdout (NDJSON)                  │
//! └──────────────────────────────┼──────────────────────────────────┘
//!                                ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           Storage worker (driver for the document store)        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod client;
mod error;
pub mod protocol;

pub use client::{WorkerClient, DEFAULT_TIMEOUT_SECS};
pub use error::{WorkerError, WorkerResult};
