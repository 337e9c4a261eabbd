// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! # Always Online
//!
//! A write-through cache of player username → (last IP, UUID), backed by a
//! single `always_online` table in MySQL (or SQLite).
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                 PlayerCache (coordinator)                   │
//! │  • get_ip / get_id: cache-aside, load once on miss          │
//! │  • update: cache first, then persist                        │
//! │  • save: bulk upsert of the whole cache                     │
//! └─────────────────────────────────────────────────────────────┘
//!              │                                 │
//!              ▼                                 ▼
//! ┌──────────────────────────┐   ┌──────────────────────────────┐
//! │       RecordCache        │   │      PersistenceGateway      │
//! │  • DashMap, per-key      │   │  • point select / upsert     │
//! │    linearizable          │   │  • batches of 1000           │
//! └──────────────────────────┘   │  • one reconnect-and-retry   │
//!                                └──────────────────────────────┘
//!                                                │
//!                                                ▼
//!                                ┌──────────────────────────────┐
//!                                │      ConnectionManager       │
//!                                │  • one live handle, RwLock   │
//!                                │  • creates table on connect  │
//!                                └──────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use always_online::{CacheConfig, PlayerCache};
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = CacheConfig {
//!         host: "localhost".into(),
//!         database: "minecraft".into(),
//!         username: "proxy".into(),
//!         password: "secret".into(),
//!         ..Default::default()
//!     };
//!
//!     let players = PlayerCache::connect(&config).await.expect("Failed to connect");
//!
//!     players.update("Notch", "10.0.0.7", Uuid::new_v4()).await;
//!     if let Some(ip) = players.get_ip("Notch").await {
//!         println!("Notch last seen at {ip}");
//!     }
//!
//!     players.shutdown().await.expect("Final flush failed");
//! }
//! ```
//!
//! ## Failure Model
//!
//! - Connecting fails loudly ([`StoreError::Connection`]).
//! - A dropped connection mid-query triggers one reconnect and one retry.
//! - `get_ip`, `get_id` and `update` never fail: lookups degrade to `None`,
//!   writes stay cached but unpersisted.
//! - [`PlayerCache::save`] reports failure.

pub mod config;
pub mod record;
pub mod storage;
pub mod connection;
pub mod cache;
pub mod gateway;
pub mod coordinator;
pub mod metrics;

pub use config::{CacheConfig, ConfigError, TABLE_NAME};
pub use record::{Record, RecordError};
pub use storage::traits::{Connector, StoreConnection, StoreError};
pub use storage::sql::SqlConnector;
pub use storage::memory::MemoryConnector;
pub use connection::ConnectionManager;
pub use cache::RecordCache;
pub use gateway::{FlushResult, PersistenceGateway};
pub use coordinator::PlayerCache;
pub use metrics::LatencyTimer;
