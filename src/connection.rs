// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Ownership of the single live store handle.
//!
//! Queries hold the shared side of an `RwLock` for the whole statement;
//! replacing the handle takes the exclusive side, so a reconnect never pulls
//! a handle out from under an in-flight query.
//!
//! Every replacement bumps a generation counter. A caller that saw a
//! communications failure passes the generation it used to
//! [`ConnectionManager::reconnect_if_current`]; if someone else already
//! replaced the handle, the reconnect is skipped.

use tokio::sync::{RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

use crate::config::TABLE_NAME;
use crate::metrics;
use crate::storage::traits::{Connector, StoreConnection, StoreError};

struct Slot<H> {
    handle: Option<H>,
    generation: u64,
    closed: bool,
}

/// Shared access to the current handle for the duration of one statement.
pub struct HandleGuard<'a, H> {
    slot: RwLockReadGuard<'a, Slot<H>>,
}

impl<H> HandleGuard<'_, H> {
    #[must_use]
    pub fn handle(&self) -> Option<&H> {
        self.slot.handle.as_ref()
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.slot.generation
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.slot.closed
    }
}

pub struct ConnectionManager<C: Connector> {
    connector: C,
    slot: RwLock<Slot<C::Connection>>,
}

impl<C: Connector> ConnectionManager<C> {
    /// Open the first handle and make sure the table exists.
    pub async fn connect(connector: C) -> Result<Self, StoreError> {
        let manager = Self {
            connector,
            slot: RwLock::new(Slot {
                handle: None,
                generation: 0,
                closed: false,
            }),
        };
        manager.reconnect().await?;
        Ok(manager)
    }

    #[must_use]
    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Shared access to the current handle.
    pub async fn read(&self) -> HandleGuard<'_, C::Connection> {
        HandleGuard {
            slot: self.slot.read().await,
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.slot.read().await.handle.is_some()
    }

    pub async fn generation(&self) -> u64 {
        self.slot.read().await.generation
    }

    /// Close the current handle (if any) and open a fresh one.
    pub async fn reconnect(&self) -> Result<(), StoreError> {
        let mut slot = self.slot.write().await;
        self.replace(&mut slot).await
    }

    /// Reconnect only if the handle is still the one at `generation`.
    ///
    /// Returns `Ok(false)` when another caller already replaced it.
    pub async fn reconnect_if_current(&self, generation: u64) -> Result<bool, StoreError> {
        let mut slot = self.slot.write().await;
        if slot.generation != generation {
            debug!(
                seen = generation,
                current = slot.generation,
                "Handle already replaced, skipping reconnect"
            );
            return Ok(false);
        }
        self.replace(&mut slot).await?;
        Ok(true)
    }

    /// Check store metadata for `table` and create it when absent.
    pub async fn ensure_table_exists(
        handle: &C::Connection,
        table: &str,
    ) -> Result<(), StoreError> {
        let exists = handle
            .table_exists(table)
            .await
            .map_err(|e| StoreError::Connection(format!("metadata query for '{}' failed: {}", table, e)))?;

        if !exists {
            info!(table, "Creating missing table");
            handle
                .create_table()
                .await
                .map_err(|e| StoreError::Connection(format!("create table '{}' failed: {}", table, e)))?;
        }
        Ok(())
    }

    /// Destroy the handle for good; later reconnects fail with `Closed`.
    pub async fn shutdown(&self) {
        let mut slot = self.slot.write().await;
        slot.closed = true;
        slot.generation += 1;
        if let Some(old) = slot.handle.take() {
            if let Err(e) = old.close().await {
                warn!(error = %e, "Error closing store connection during shutdown");
            }
        }
        info!(store = %self.connector.describe(), "Store connection shut down");
    }

    async fn replace(&self, slot: &mut Slot<C::Connection>) -> Result<(), StoreError> {
        if slot.closed {
            return Err(StoreError::Closed);
        }

        if let Some(old) = slot.handle.take() {
            if let Err(e) = old.close().await {
                warn!(error = %e, "Error closing stale store connection");
            }
        }
        slot.generation += 1;

        let target = self.connector.describe();
        let handle = match self.connector.open().await {
            Ok(handle) => handle,
            Err(e) => {
                metrics::record_connect(false);
                return Err(match e {
                    StoreError::Connection(_) => e,
                    other => StoreError::Connection(other.to_string()),
                });
            }
        };

        if let Err(e) = Self::ensure_table_exists(&handle, TABLE_NAME).await {
            metrics::record_connect(false);
            if let Err(close_err) = handle.close().await {
                warn!(error = %close_err, "Error closing connection after schema failure");
            }
            return Err(e);
        }

        metrics::record_connect(true);
        info!(store = %target, generation = slot.generation, "Connected to store");
        slot.handle = Some(handle);
        Ok(())
    }
}
