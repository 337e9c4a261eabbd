// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQL backend for the `always_online` table.
//!
//! Schema (MySQL):
//! ```sql
//! CREATE TABLE always_online (
//!   name CHAR(16) NOT NULL,
//!   ip   CHAR(15) NOT NULL,
//!   uuid CHAR(36) NOT NULL,
//!   PRIMARY KEY (name)
//! ) ENGINE = MyISAM
//! ```
//!
//! SQLite gets the same columns and uses `ON CONFLICT(name) DO UPDATE` in
//! place of `ON DUPLICATE KEY UPDATE`.
//!
//! ## sqlx Any Driver Quirks
//!
//! The `Any` driver can hand MySQL `CHAR` columns back as bytes, so text
//! columns are read as `String` first and as `Vec<u8>` second.

use async_trait::async_trait;
use sqlx::{AnyPool, Row, any::{AnyPoolOptions, AnyRow}};
use std::sync::Once;
use std::time::Duration;
use uuid::Uuid;

use super::traits::{Connector, StoreConnection, StoreError};
use crate::config::{CacheConfig, TABLE_NAME};
use crate::record::Record;

// SQLx `Any` driver requires runtime installation
static INSTALL_DRIVERS: Once = Once::new();

fn install_drivers() {
    INSTALL_DRIVERS.call_once(|| {
        sqlx::any::install_default_drivers();
    });
}

const SELECT_SQL: &str = "SELECT uuid, ip FROM always_online WHERE name = ?";

const MYSQL_UPSERT_SQL: &str =
    "INSERT INTO always_online (name, ip, uuid) VALUES (?, ?, ?) \
     ON DUPLICATE KEY UPDATE ip = VALUES(ip), uuid = VALUES(uuid)";

const SQLITE_UPSERT_SQL: &str =
    "INSERT INTO always_online (name, ip, uuid) VALUES (?, ?, ?) \
     ON CONFLICT(name) DO UPDATE SET ip = excluded.ip, uuid = excluded.uuid";

const MYSQL_CREATE_SQL: &str =
    "CREATE TABLE `always_online` ( `name` CHAR(16) NOT NULL , `ip` CHAR(15) NOT NULL , \
     `uuid` CHAR(36) NOT NULL , PRIMARY KEY (`name`)) ENGINE = MyISAM";

/// Bound parameters per upserted row (name, ip, uuid).
const PARAMS_PER_ROW: usize = 3;

/// `SQLITE_MAX_VARIABLE_NUMBER` of the bundled SQLite.
const SQLITE_MAX_PARAMS: usize = 32_766;

/// Prepared-statement placeholder limit of the MySQL protocol.
const MYSQL_MAX_PARAMS: usize = 65_535;

const SQLITE_CREATE_SQL: &str =
    "CREATE TABLE always_online ( name CHAR(16) NOT NULL PRIMARY KEY, \
     ip CHAR(15) NOT NULL, uuid CHAR(36) NOT NULL )";

/// Map a driver error onto the store taxonomy.
///
/// Transport failures and SQLSTATE class `08` (connection exception) are
/// communications failures; everything else is a query failure.
pub(crate) fn classify(err: sqlx::Error) -> StoreError {
    let transient = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Protocol(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        sqlx::Error::Database(db) => db.code().is_some_and(|code| code.starts_with("08")),
        _ => false,
    };

    if transient {
        StoreError::Communication(err.to_string())
    } else {
        StoreError::Query(err.to_string())
    }
}

/// Read a text column as `String`, falling back to UTF-8 bytes.
fn text_column(row: &AnyRow, column: &str) -> Option<String> {
    row.try_get::<String, _>(column).ok().or_else(|| {
        row.try_get::<Vec<u8>, _>(column)
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
    })
}

/// Opens pooled sqlx handles (one connection per handle).
#[derive(Debug, Clone)]
pub struct SqlConnector {
    url: String,
    redacted: String,
    is_sqlite: bool,
    connect_timeout: Duration,
}

impl SqlConnector {
    /// Fails with [`StoreError::Connection`] when the config cannot be
    /// turned into a connection URL.
    pub fn new(config: &CacheConfig) -> Result<Self, StoreError> {
        let url = config
            .connection_url()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Self {
            url,
            redacted: config.redacted_url(),
            is_sqlite: config.is_sqlite(),
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
        })
    }

    #[must_use]
    pub fn is_sqlite(&self) -> bool {
        self.is_sqlite
    }
}

#[async_trait]
impl Connector for SqlConnector {
    type Connection = SqlConnection;

    async fn open(&self) -> Result<SqlConnection, StoreError> {
        install_drivers();

        let pool = AnyPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(self.connect_timeout)
            .connect(&self.url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        Ok(SqlConnection {
            pool,
            is_sqlite: self.is_sqlite,
        })
    }

    fn describe(&self) -> String {
        self.redacted.clone()
    }

    fn max_batch_rows(&self) -> usize {
        let params = if self.is_sqlite { SQLITE_MAX_PARAMS } else { MYSQL_MAX_PARAMS };
        params / PARAMS_PER_ROW
    }
}

/// A live handle: a single-connection pool, so one statement is in flight
/// at a time.
pub struct SqlConnection {
    pool: AnyPool,
    is_sqlite: bool,
}

impl SqlConnection {
    fn upsert_sql(&self) -> &'static str {
        if self.is_sqlite {
            SQLITE_UPSERT_SQL
        } else {
            MYSQL_UPSERT_SQL
        }
    }
}

/// Multi-row form of the upsert statement for `rows` records.
fn batch_upsert_sql(is_sqlite: bool, rows: usize) -> String {
    let placeholders: Vec<&str> = (0..rows).map(|_| "(?, ?, ?)").collect();
    let conflict = if is_sqlite {
        "ON CONFLICT(name) DO UPDATE SET ip = excluded.ip, uuid = excluded.uuid"
    } else {
        "ON DUPLICATE KEY UPDATE ip = VALUES(ip), uuid = VALUES(uuid)"
    };
    format!(
        "INSERT INTO always_online (name, ip, uuid) VALUES {} {}",
        placeholders.join(", "),
        conflict
    )
}

#[async_trait]
impl StoreConnection for SqlConnection {
    async fn table_exists(&self, table: &str) -> Result<bool, StoreError> {
        let sql = if self.is_sqlite {
            "SELECT COUNT(*) AS cnt FROM sqlite_master WHERE type = 'table' AND name = ?"
        } else {
            "SELECT COUNT(*) AS cnt FROM information_schema.tables \
             WHERE table_schema = DATABASE() AND table_name = ?"
        };

        let row = sqlx::query(sql)
            .bind(table)
            .fetch_one(&self.pool)
            .await
            .map_err(classify)?;

        let count: i64 = row.try_get("cnt").map_err(classify)?;
        Ok(count > 0)
    }

    async fn create_table(&self) -> Result<(), StoreError> {
        let sql = if self.is_sqlite { SQLITE_CREATE_SQL } else { MYSQL_CREATE_SQL };
        sqlx::query(sql)
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn select(&self, username: &str) -> Result<Option<Record>, StoreError> {
        let row = sqlx::query(SELECT_SQL)
            .bind(username)
            .fetch_optional(&self.pool)
            .await
            .map_err(classify)?;

        let Some(row) = row else {
            return Ok(None);
        };

        let corrupt = |detail: String| StoreError::Corruption {
            username: username.to_string(),
            detail,
        };

        let uuid = text_column(&row, "uuid").ok_or_else(|| corrupt("unreadable uuid column".into()))?;
        let ip = text_column(&row, "ip").ok_or_else(|| corrupt("unreadable ip column".into()))?;
        let id = Uuid::parse_str(uuid.trim())
            .map_err(|e| corrupt(format!("bad uuid '{}': {}", uuid.trim(), e)))?;

        Ok(Some(Record::new(username, ip.trim_end(), id)))
    }

    async fn upsert(&self, record: &Record) -> Result<(), StoreError> {
        sqlx::query(self.upsert_sql())
            .bind(record.username())
            .bind(record.ip())
            .bind(record.id_string())
            .execute(&self.pool)
            .await
            .map_err(classify)?;
        Ok(())
    }

    async fn upsert_batch(&self, records: &[Record]) -> Result<(), StoreError> {
        if records.is_empty() {
            return Ok(());
        }

        let sql = batch_upsert_sql(self.is_sqlite, records.len());
        let mut query = sqlx::query(&sql);
        for record in records {
            query = query
                .bind(record.username())
                .bind(record.ip())
                .bind(record.id_string());
        }

        query.execute(&self.pool).await.map_err(classify)?;
        Ok(())
    }

    async fn close(self) -> Result<(), StoreError> {
        self.pool.close().await;
        Ok(())
    }
}

impl std::fmt::Debug for SqlConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlConnection")
            .field("table", &TABLE_NAME)
            .field("is_sqlite", &self.is_sqlite)
            .finish()
    }
}
