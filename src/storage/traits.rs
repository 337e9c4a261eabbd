// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

use async_trait::async_trait;
use crate::record::{Record, RecordError};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum StoreError {
    /// Opening the connection or checking the schema failed
    #[error("Connection error: {0}")]
    Connection(String),
    /// The live connection dropped mid-operation
    #[error("Communications failure: {0}")]
    Communication(String),
    #[error("Query error: {0}")]
    Query(String),
    #[error("Corrupt row for '{username}': {detail}")]
    Corruption {
        username: String,
        detail: String,
    },
    #[error("Refusing to persist invalid record: {0}")]
    InvalidRecord(#[from] RecordError),
    #[error("Connection manager is shut down")]
    Closed,
}

impl StoreError {
    /// Whether a reconnect-and-retry may help.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Communication(_))
    }
}

/// Opens connection handles to the backing store.
///
/// A connector holds everything needed to (re)open a handle; the
/// [`ConnectionManager`](crate::connection::ConnectionManager) decides when.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: StoreConnection;

    async fn open(&self) -> Result<Self::Connection, StoreError>;

    /// Human-readable target for logs (never contains credentials).
    fn describe(&self) -> String;

    /// Most records one `upsert_batch` call can carry.
    fn max_batch_rows(&self) -> usize {
        usize::MAX
    }
}

/// One live handle to the `always_online` table.
///
/// Every method is a single round trip. `upsert_batch` executes all given
/// records as one batch; chunking is the caller's job.
#[async_trait]
pub trait StoreConnection: Send + Sync {
    async fn table_exists(&self, table: &str) -> Result<bool, StoreError>;
    async fn create_table(&self) -> Result<(), StoreError>;
    async fn select(&self, username: &str) -> Result<Option<Record>, StoreError>;
    async fn upsert(&self, record: &Record) -> Result<(), StoreError>;
    async fn upsert_batch(&self, records: &[Record]) -> Result<(), StoreError>;
    async fn close(self) -> Result<(), StoreError>;
}
