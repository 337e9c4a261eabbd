// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Point lookups, point upserts and batched upserts against the store.
//!
//! Every statement goes through one bounded loop: a communications failure
//! triggers a reconnect and exactly one further attempt. Any other failure
//! is returned immediately. Errors are returned,
//! not logged here; the caller decides how loud to be.

use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::connection::ConnectionManager;
use crate::metrics::{self, LatencyTimer};
use crate::record::Record;
use crate::storage::traits::{Connector, StoreConnection, StoreError};

/// Outcome of a bulk upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlushResult {
    /// Records sent to the store
    pub written: usize,
    /// Batch executions issued
    pub batches: usize,
    /// Invalid records left out
    pub skipped: usize,
}

enum Op<'a> {
    Fetch(&'a str),
    Upsert(&'a Record),
    Batch(&'a [Record]),
}

impl Op<'_> {
    fn name(&self) -> &'static str {
        match self {
            Op::Fetch(_) => "fetch",
            Op::Upsert(_) => "upsert",
            Op::Batch(_) => "batch",
        }
    }
}

enum Outcome {
    Fetched(Option<Record>),
    Written,
}

/// Reconnect-and-retry attempts after a communications failure.
const MAX_RETRIES: usize = 1;

pub struct PersistenceGateway<C: Connector> {
    connection: ConnectionManager<C>,
    batch_size: usize,
}

impl<C: Connector> PersistenceGateway<C> {
    /// `config.batch_size` is capped at what one batch statement of the
    /// connector can hold.
    pub fn new(connection: ConnectionManager<C>, config: &CacheConfig) -> Self {
        let limit = connection.connector().max_batch_rows().max(1);
        let batch_size = config.batch_size.clamp(1, limit);
        if batch_size < config.batch_size {
            warn!(
                requested = config.batch_size,
                batch_size,
                "Batch size exceeds statement parameter limit, capping"
            );
        }
        Self {
            connection,
            batch_size,
        }
    }

    #[must_use]
    pub fn connection(&self) -> &ConnectionManager<C> {
        &self.connection
    }

    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Point lookup by username.
    pub async fn fetch(&self, username: &str) -> Result<Option<Record>, StoreError> {
        match self.execute(Op::Fetch(username)).await? {
            Outcome::Fetched(record) => Ok(record),
            Outcome::Written => Ok(None),
        }
    }

    /// Insert, or overwrite ip and uuid of the existing row.
    pub async fn upsert(&self, record: &Record) -> Result<(), StoreError> {
        record.validate()?;
        self.execute(Op::Upsert(record)).await?;
        Ok(())
    }

    /// Upsert `records` in order, one batch execution per `batch_size`
    /// records plus one for the remainder.
    ///
    /// Stops at the first failed batch; earlier batches stay persisted.
    pub async fn bulk_upsert(&self, records: &[Record]) -> Result<FlushResult, StoreError> {
        let mut result = FlushResult::default();

        let valid: Vec<Record> = records
            .iter()
            .filter(|record| match record.validate() {
                Ok(()) => true,
                Err(e) => {
                    warn!(username = %record.username(), error = %e, "Skipping invalid record in flush");
                    false
                }
            })
            .cloned()
            .collect();
        result.skipped = records.len() - valid.len();

        for chunk in valid.chunks(self.batch_size) {
            self.execute(Op::Batch(chunk)).await?;
            metrics::record_batch_size(chunk.len());
            result.batches += 1;
            result.written += chunk.len();
            debug!(batch = result.batches, size = chunk.len(), written = result.written, "Executed upsert batch");
        }

        Ok(result)
    }

    async fn dispatch(handle: &C::Connection, op: &Op<'_>) -> Result<Outcome, StoreError> {
        match op {
            Op::Fetch(username) => handle.select(username).await.map(Outcome::Fetched),
            Op::Upsert(record) => handle.upsert(record).await.map(|()| Outcome::Written),
            Op::Batch(records) => handle.upsert_batch(records).await.map(|()| Outcome::Written),
        }
    }

    async fn execute(&self, op: Op<'_>) -> Result<Outcome, StoreError> {
        let operation = op.name();
        let _timer = LatencyTimer::new(operation);
        let mut retries = 0;

        loop {
            let (generation, result) = {
                let guard = self.connection.read().await;
                if guard.is_closed() {
                    return Err(StoreError::Closed);
                }
                let result = match guard.handle() {
                    Some(handle) => Self::dispatch(handle, &op).await,
                    None => Err(StoreError::Communication("no live connection".to_string())),
                };
                (guard.generation(), result)
            };

            match result {
                Err(e) if e.is_transient() && retries < MAX_RETRIES => {
                    retries += 1;
                    warn!(
                        operation,
                        attempt = retries,
                        error = %e,
                        "Communications failure, reconnecting before retry"
                    );
                    metrics::record_reconnect(operation);
                    if let Err(reconnect_err) = self.connection.reconnect_if_current(generation).await {
                        metrics::record_store_operation(operation, "error");
                        return Err(reconnect_err);
                    }
                }
                Ok(outcome) => {
                    let status = match &outcome {
                        Outcome::Fetched(None) => "not_found",
                        _ => "success",
                    };
                    metrics::record_store_operation(operation, status);
                    return Ok(outcome);
                }
                Err(e) => {
                    metrics::record_store_operation(operation, "error");
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::{MemoryConnection, MemoryConnector};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use uuid::Uuid;

    /// Memory connector whose handles fail the next `drops` statements with a
    /// communications error.
    #[derive(Clone)]
    struct DroppingConnector {
        inner: MemoryConnector,
        drops: Arc<AtomicUsize>,
        max_rows: usize,
    }

    struct DroppingConnection {
        inner: MemoryConnection,
        drops: Arc<AtomicUsize>,
    }

    impl DroppingConnection {
        fn maybe_drop(&self) -> Result<(), StoreError> {
            let dropped = self
                .drops
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if dropped {
                Err(StoreError::Communication("connection reset".into()))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Connector for DroppingConnector {
        type Connection = DroppingConnection;

        async fn open(&self) -> Result<DroppingConnection, StoreError> {
            Ok(DroppingConnection {
                inner: self.inner.open().await?,
                drops: self.drops.clone(),
            })
        }

        fn describe(&self) -> String {
            "dropping".into()
        }

        fn max_batch_rows(&self) -> usize {
            self.max_rows
        }
    }

    #[async_trait]
    impl StoreConnection for DroppingConnection {
        async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
            self.inner.table_exists(table).await
        }
        async fn create_table(&self) -> Result<(), StoreError> {
            self.inner.create_table().await
        }
        async fn select(&self, username: &str) -> Result<Option<Record>, StoreError> {
            self.maybe_drop()?;
            self.inner.select(username).await
        }
        async fn upsert(&self, record: &Record) -> Result<(), StoreError> {
            self.maybe_drop()?;
            self.inner.upsert(record).await
        }
        async fn upsert_batch(&self, records: &[Record]) -> Result<(), StoreError> {
            self.maybe_drop()?;
            self.inner.upsert_batch(records).await
        }
        async fn close(self) -> Result<(), StoreError> {
            self.inner.close().await
        }
    }

    async fn gateway_with(
        memory: &MemoryConnector,
        drops: usize,
        max_rows: usize,
        config: &CacheConfig,
    ) -> PersistenceGateway<DroppingConnector> {
        let connector = DroppingConnector {
            inner: memory.clone(),
            drops: Arc::new(AtomicUsize::new(drops)),
            max_rows,
        };
        let manager = ConnectionManager::connect(connector).await.unwrap();
        PersistenceGateway::new(manager, config)
    }

    async fn gateway(memory: &MemoryConnector, drops: usize) -> PersistenceGateway<DroppingConnector> {
        gateway_with(memory, drops, usize::MAX, &CacheConfig::default()).await
    }

    fn records(n: usize) -> Vec<Record> {
        (0..n)
            .map(|i| Record::new(format!("p{i}"), "10.0.0.1", Uuid::new_v4()))
            .collect()
    }

    #[tokio::test]
    async fn test_fetch_found_and_missing() {
        let memory = MemoryConnector::new();
        let stored = Record::new("alex", "1.2.3.4", Uuid::new_v4());
        memory.insert_row(stored.clone());
        let gw = gateway(&memory, 0).await;

        assert_eq!(gw.fetch("alex").await.unwrap(), Some(stored));
        assert_eq!(gw.fetch("steve").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_fetch_retries_once_after_drop() {
        let memory = MemoryConnector::new();
        memory.insert_row(Record::new("alex", "1.2.3.4", Uuid::new_v4()));
        let gw = gateway(&memory, 1).await;

        assert!(gw.fetch("alex").await.unwrap().is_some());
        assert_eq!(memory.stats().opens.load(Ordering::SeqCst), 2);
        assert_eq!(memory.stats().selects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_second_drop_is_not_retried() {
        let memory = MemoryConnector::new();
        memory.insert_row(Record::new("alex", "1.2.3.4", Uuid::new_v4()));
        let gw = gateway(&memory, 2).await;

        let err = gw.fetch("alex").await.unwrap_err();

        assert!(err.is_transient());
        assert_eq!(memory.stats().opens.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_query_error_is_not_retried() {
        let memory = MemoryConnector::new();
        let gw = gateway(&memory, 0).await;

        let invalid = Record::new("bad name", "1.2.3.4", Uuid::new_v4());
        assert!(matches!(gw.upsert(&invalid).await, Err(StoreError::InvalidRecord(_))));
        assert_eq!(memory.stats().upserts.load(Ordering::SeqCst), 0);
        assert_eq!(memory.stats().opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_upsert_retries_once_after_drop() {
        let memory = MemoryConnector::new();
        let gw = gateway(&memory, 1).await;
        let record = Record::new("alex", "1.2.3.4", Uuid::new_v4());

        gw.upsert(&record).await.unwrap();

        assert_eq!(memory.row("alex"), Some(record));
    }

    #[tokio::test]
    async fn test_bulk_upsert_batch_boundaries() {
        for (n, expected_batches) in [(0, 0), (1, 1), (999, 1), (1000, 1), (1001, 2), (2500, 3)] {
            let memory = MemoryConnector::new();
            let gw = gateway(&memory, 0).await;

            let result = gw.bulk_upsert(&records(n)).await.unwrap();

            assert_eq!(result.batches, expected_batches, "n = {n}");
            assert_eq!(result.written, n);
            assert_eq!(memory.stats().batches.load(Ordering::SeqCst), expected_batches as u64);
            assert_eq!(memory.len(), n);
        }
    }

    #[tokio::test]
    async fn test_bulk_upsert_skips_invalid() {
        let memory = MemoryConnector::new();
        let gw = gateway(&memory, 0).await;
        let mut input = records(3);
        input.push(Record::new("", "1.2.3.4", Uuid::new_v4()));

        let result = gw.bulk_upsert(&input).await.unwrap();

        assert_eq!(result, FlushResult { written: 3, batches: 1, skipped: 1 });
    }

    #[tokio::test]
    async fn test_bulk_upsert_survives_one_drop() {
        let memory = MemoryConnector::new();
        let gw = gateway(&memory, 1).await;

        let result = gw.bulk_upsert(&records(1500)).await.unwrap();

        assert_eq!(result.batches, 2);
        assert_eq!(memory.len(), 1500);
    }

    #[tokio::test]
    async fn test_closed_manager_fails_fast() {
        let memory = MemoryConnector::new();
        let gw = gateway(&memory, 0).await;
        gw.connection().shutdown().await;

        assert!(matches!(gw.fetch("alex").await, Err(StoreError::Closed)));
        assert_eq!(memory.stats().opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_batch_size_capped_at_statement_limit() {
        let memory = MemoryConnector::new();
        let config = CacheConfig { batch_size: 12_000, ..Default::default() };
        let gw = gateway_with(&memory, 0, 100, &config).await;

        assert_eq!(gw.batch_size(), 100);

        let result = gw.bulk_upsert(&records(250)).await.unwrap();
        assert_eq!(result.batches, 3);
        assert_eq!(memory.len(), 250);
    }

    #[tokio::test]
    async fn test_batch_size_within_limit_is_kept() {
        let memory = MemoryConnector::new();
        let zero = CacheConfig { batch_size: 0, ..Default::default() };

        assert_eq!(gateway(&memory, 0).await.batch_size(), 1000);
        assert_eq!(gateway_with(&memory, 0, 100, &zero).await.batch_size(), 1);
    }
}
