// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Player cache coordinator.
//!
//! The [`PlayerCache`] ties the [`RecordCache`] to the store through the
//! [`PersistenceGateway`]:
//! - lookups are cache-aside: hit returns immediately, miss loads once
//! - updates are write-through: cache first, then the store
//! - `save` bulk-upserts everything cached, batched by record count
//!
//! Storage failures never escape `get_ip`, `get_id` or `update`. A failed
//! lookup reads as unknown and a failed write leaves the record cached but
//! unpersisted. `save` is the one operation that reports failure.
//!
//! # Example
//!
//! ```rust
//! use always_online::{CacheConfig, MemoryConnector, PlayerCache};
//! use uuid::Uuid;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let cache = PlayerCache::with_connector(MemoryConnector::new(), &CacheConfig::default())
//!     .await
//!     .expect("connect");
//!
//! let id = Uuid::new_v4();
//! cache.update("Notch", "10.0.0.7", id).await;
//!
//! assert_eq!(cache.get_ip("Notch").await.as_deref(), Some("10.0.0.7"));
//! assert_eq!(cache.get_id("Notch").await, Some(id));
//! # }
//! ```

mod flush;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::cache::RecordCache;
use crate::config::CacheConfig;
use crate::connection::ConnectionManager;
use crate::gateway::PersistenceGateway;
use crate::metrics;
use crate::record::Record;
use crate::storage::sql::SqlConnector;
use crate::storage::traits::{Connector, StoreError};

/// Write-through cache of username → (ip, uuid).
pub struct PlayerCache<C: Connector = SqlConnector> {
    cache: RecordCache,
    gateway: PersistenceGateway<C>,
}

impl PlayerCache<SqlConnector> {
    /// Connect to the SQL store described by `config`.
    ///
    /// Fails with [`StoreError::Connection`] if the config does not form a
    /// valid connection URL, the database is unreachable or the table cannot
    /// be created.
    pub async fn connect(config: &CacheConfig) -> Result<Self, StoreError> {
        Self::with_connector(SqlConnector::new(config)?, config).await
    }
}

impl<C: Connector> PlayerCache<C> {
    pub async fn with_connector(connector: C, config: &CacheConfig) -> Result<Self, StoreError> {
        let connection = ConnectionManager::connect(connector).await?;
        Ok(Self {
            cache: RecordCache::new(),
            gateway: PersistenceGateway::new(connection, config),
        })
    }

    #[must_use]
    pub fn gateway(&self) -> &PersistenceGateway<C> {
        &self.gateway
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        self.gateway.connection().connector()
    }

    /// Last known address of `username`, or `None` if unknown.
    pub async fn get_ip(&self, username: &str) -> Option<String> {
        self.lookup(username).await.map(|r| r.ip().to_string())
    }

    /// Identifier of `username`, or `None` if unknown.
    pub async fn get_id(&self, username: &str) -> Option<Uuid> {
        self.lookup(username).await.map(|r| r.id())
    }

    /// Full record for `username`, loading it from the store on a miss.
    ///
    /// `None` covers both "no row" and "store unreachable after one
    /// reconnect"; the second case is logged.
    #[tracing::instrument(skip(self), fields(source))]
    pub async fn lookup(&self, username: &str) -> Option<Record> {
        if let Some(record) = self.cache.get(username) {
            tracing::Span::current().record("source", "cache");
            metrics::record_cache_lookup(true);
            return Some(record);
        }
        metrics::record_cache_lookup(false);

        match self.gateway.fetch(username).await {
            Ok(Some(record)) => {
                tracing::Span::current().record("source", "store");
                // An update that raced with the fetch wins.
                let record = self.cache.put_if_absent(record);
                metrics::set_cached_records(self.cache.len());
                Some(record)
            }
            Ok(None) => {
                debug!("Unknown player");
                None
            }
            Err(e) => {
                warn!(error = %e, "Store lookup failed, treating player as unknown");
                None
            }
        }
    }

    /// Record a login: cache now, persist immediately after.
    ///
    /// The cache write is visible to concurrent lookups before the store is
    /// touched. A failed persist is logged and the cached value kept.
    #[tracing::instrument(skip(self, id), fields(id = %id))]
    pub async fn update(&self, username: &str, ip: &str, id: Uuid) {
        let record = Record::new(username, ip, id);
        self.cache.put(record.clone());
        metrics::set_cached_records(self.cache.len());

        if let Err(e) = self.gateway.upsert(&record).await {
            warn!(error = %e, "Failed to persist player, keeping cached value");
        }
    }

    /// Drop every cached record. The store is untouched.
    pub fn reset_cache(&self) {
        self.cache.clear();
        metrics::set_cached_records(0);
        debug!("Player cache cleared");
    }

    /// Number of cached records
    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub async fn is_connected(&self) -> bool {
        self.gateway.connection().is_connected().await
    }
}
