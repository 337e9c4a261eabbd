// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Checkpointing and shutdown.

use std::time::Instant;
use tracing::{error, info};

use crate::gateway::FlushResult;
use crate::metrics;
use crate::storage::traits::{Connector, StoreError};

use super::PlayerCache;

impl<C: Connector> PlayerCache<C> {
    /// Persist every cached record.
    ///
    /// Works from a snapshot, so updates racing with the flush may or may
    /// not be included (they were persisted individually anyway). A failure
    /// part-way leaves earlier batches persisted.
    #[tracing::instrument(skip(self), fields(records))]
    pub async fn save(&self) -> Result<FlushResult, StoreError> {
        let start = Instant::now();
        let snapshot = self.cache.snapshot();
        tracing::Span::current().record("records", snapshot.len());

        let result = self.gateway.bulk_upsert(&snapshot).await;
        metrics::record_flush_duration(start.elapsed());

        match &result {
            Ok(flushed) => info!(
                written = flushed.written,
                batches = flushed.batches,
                skipped = flushed.skipped,
                duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Player cache flushed"
            ),
            Err(e) => error!(error = %e, "Player cache flush failed"),
        }
        result
    }

    /// Flush, then destroy the store connection for good.
    ///
    /// The connection is closed even when the flush fails; the flush error is
    /// returned.
    pub async fn shutdown(&self) -> Result<FlushResult, StoreError> {
        info!("Shutting down player cache...");
        let result = self.save().await;
        self.gateway.connection().shutdown().await;
        result
    }
}

#[cfg(test)]
mod tests {
    use crate::config::CacheConfig;
    use crate::coordinator::PlayerCache;
    use crate::record::Record;
    use crate::storage::memory::MemoryConnector;
    use crate::storage::traits::StoreError;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    async fn cache_over(memory: &MemoryConnector) -> PlayerCache<MemoryConnector> {
        PlayerCache::with_connector(memory.clone(), &CacheConfig::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_save_empty_cache_issues_no_batch() {
        let memory = MemoryConnector::new();
        let cache = cache_over(&memory).await;

        let result = cache.save().await.unwrap();

        assert_eq!(result.batches, 0);
        assert_eq!(memory.stats().batches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_save_restores_rows_written_elsewhere() {
        let memory = MemoryConnector::new();
        let cache = cache_over(&memory).await;
        let id = Uuid::new_v4();
        cache.update("alex", "1.2.3.4", id).await;

        // Another writer clobbers the row; the cache is still authoritative.
        memory.insert_row(Record::new("alex", "9.9.9.9", Uuid::new_v4()));
        cache.save().await.unwrap();

        assert_eq!(memory.row("alex"), Some(Record::new("alex", "1.2.3.4", id)));
    }

    #[tokio::test]
    async fn test_batch_boundary_1000_and_1001() {
        for (n, batches) in [(1000usize, 1u64), (1001, 2)] {
            let memory = MemoryConnector::new();
            let cache = cache_over(&memory).await;
            for i in 0..n {
                cache.update(&format!("p{i}"), "10.1.1.1", Uuid::new_v4()).await;
            }

            let result = cache.save().await.unwrap();

            assert_eq!(result.written, n);
            assert_eq!(memory.stats().batches.load(Ordering::SeqCst), batches);
        }
    }

    #[tokio::test]
    async fn test_restart_reads_flushed_value() {
        let memory = MemoryConnector::new();
        let id = Uuid::new_v4();
        {
            let cache = cache_over(&memory).await;
            cache.update("alex", "1.2.3.4", id).await;
            cache.shutdown().await.unwrap();
        }

        let restarted = cache_over(&memory).await;
        let selects_before = memory.stats().selects.load(Ordering::SeqCst);

        assert_eq!(restarted.get_ip("alex").await.as_deref(), Some("1.2.3.4"));
        assert_eq!(restarted.get_id("alex").await, Some(id));
        assert_eq!(memory.stats().selects.load(Ordering::SeqCst), selects_before + 1);
    }

    #[tokio::test]
    async fn test_save_after_shutdown_fails() {
        let memory = MemoryConnector::new();
        let cache = cache_over(&memory).await;
        cache.update("alex", "1.2.3.4", Uuid::new_v4()).await;
        cache.shutdown().await.unwrap();

        assert!(matches!(cache.save().await, Err(StoreError::Closed)));
        // Lookups keep answering from memory.
        assert_eq!(cache.get_ip("alex").await.as_deref(), Some("1.2.3.4"));
    }
}
