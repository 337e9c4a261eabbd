// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Backing-store connectors.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      Storage Module                          │
//! ├──────────────────────────────────────────────────────────────┤
//! │  traits.rs  - Connector / StoreConnection seams, StoreError  │
//! │  sql.rs     - sqlx Any driver (MySQL, SQLite)                │
//! │  memory.rs  - In-process table shared across restarts        │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod traits;
pub mod sql;
pub mod memory;

pub use traits::{Connector, StoreConnection, StoreError};
pub use sql::{SqlConnection, SqlConnector};
pub use memory::{MemoryConnection, MemoryConnector, MemoryStats};
