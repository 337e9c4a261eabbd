// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-process stand-in for the `always_online` table.
//!
//! Every handle opened from one [`MemoryConnector`] (and its clones) shares
//! the same table, so a fresh `PlayerCache` over a cloned connector behaves
//! like a process restart against the same database.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use super::traits::{Connector, StoreConnection, StoreError};
use crate::record::Record;

/// Round-trip counters, shared by every handle of a connector.
#[derive(Debug, Default)]
pub struct MemoryStats {
    pub opens: AtomicU64,
    pub closes: AtomicU64,
    pub selects: AtomicU64,
    pub upserts: AtomicU64,
    pub batches: AtomicU64,
    pub tables_created: AtomicU64,
}

impl MemoryStats {
    /// Point selects plus point upserts plus batch executions.
    #[must_use]
    pub fn round_trips(&self) -> u64 {
        self.selects.load(Ordering::SeqCst)
            + self.upserts.load(Ordering::SeqCst)
            + self.batches.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct Shared {
    rows: DashMap<String, Record>,
    table_exists: AtomicBool,
    stats: MemoryStats,
}

#[derive(Clone, Default)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
}

impl MemoryConnector {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn stats(&self) -> &MemoryStats {
        &self.shared.stats
    }

    /// Stored row for `username`, bypassing any cache.
    #[must_use]
    pub fn row(&self, username: &str) -> Option<Record> {
        self.shared.rows.get(username).map(|r| r.value().clone())
    }

    /// Number of stored rows
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.shared.rows.is_empty()
    }

    #[must_use]
    pub fn table_exists(&self) -> bool {
        self.shared.table_exists.load(Ordering::SeqCst)
    }

    /// Seed a row directly, as if another process had written it.
    pub fn insert_row(&self, record: Record) {
        self.shared.table_exists.store(true, Ordering::SeqCst);
        self.shared.rows.insert(record.username().to_string(), record);
    }
}

impl std::fmt::Debug for MemoryConnector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryConnector")
            .field("rows", &self.shared.rows.len())
            .finish()
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Connection = MemoryConnection;

    async fn open(&self) -> Result<MemoryConnection, StoreError> {
        self.shared.stats.opens.fetch_add(1, Ordering::SeqCst);
        Ok(MemoryConnection {
            shared: Arc::clone(&self.shared),
        })
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

pub struct MemoryConnection {
    shared: Arc<Shared>,
}

impl MemoryConnection {
    fn require_table(&self) -> Result<(), StoreError> {
        if self.shared.table_exists.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Query("Table 'always_online' doesn't exist".to_string()))
        }
    }
}

#[async_trait]
impl StoreConnection for MemoryConnection {
    async fn table_exists(&self, _table: &str) -> Result<bool, StoreError> {
        Ok(self.shared.table_exists.load(Ordering::SeqCst))
    }

    async fn create_table(&self) -> Result<(), StoreError> {
        if self.shared.table_exists.swap(true, Ordering::SeqCst) {
            return Err(StoreError::Query("Table 'always_online' already exists".to_string()));
        }
        self.shared.stats.tables_created.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn select(&self, username: &str) -> Result<Option<Record>, StoreError> {
        self.shared.stats.selects.fetch_add(1, Ordering::SeqCst);
        self.require_table()?;
        Ok(self.shared.rows.get(username).map(|r| r.value().clone()))
    }

    async fn upsert(&self, record: &Record) -> Result<(), StoreError> {
        self.shared.stats.upserts.fetch_add(1, Ordering::SeqCst);
        self.require_table()?;
        self.shared.rows.insert(record.username().to_string(), record.clone());
        Ok(())
    }

    async fn upsert_batch(&self, records: &[Record]) -> Result<(), StoreError> {
        self.shared.stats.batches.fetch_add(1, Ordering::SeqCst);
        self.require_table()?;
        for record in records {
            self.shared.rows.insert(record.username().to_string(), record.clone());
        }
        Ok(())
    }

    async fn close(self) -> Result<(), StoreError> {
        self.shared.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
