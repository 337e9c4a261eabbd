// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Configuration for the player cache.
//!
//! # Example
//!
//! ```
//! use always_online::CacheConfig;
//!
//! // Minimal config (uses defaults)
//! let config = CacheConfig::default();
//! assert_eq!(config.port, 3306);
//! assert_eq!(config.batch_size, 1000);
//!
//! // Explicit MySQL credentials
//! let config = CacheConfig {
//!     host: "db.internal".into(),
//!     database: "minecraft".into(),
//!     username: "proxy".into(),
//!     password: "secret".into(),
//!     ..Default::default()
//! };
//! assert!(config.connection_url().unwrap().starts_with("mysql://"));
//! ```

use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use thiserror::Error;
use url::Url;

/// Table every record lives in.
pub const TABLE_NAME: &str = "always_online";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid database host '{host}': {reason}")]
    InvalidHost { host: String, reason: String },
    #[error("invalid connection url: {0}")]
    InvalidUrl(String),
}

/// Configuration for the player cache.
///
/// The five connection fields mirror the host's config file. `sql_url`, when
/// set, replaces them entirely (e.g. `sqlite://players.db?mode=rwc`).
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    /// Full connection string overriding host/port/database/credentials
    #[serde(default)]
    pub sql_url: Option<String>,

    /// Records per batch execution during a flush
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_host() -> String { "localhost".to_string() }
fn default_port() -> u16 { 3306 }
fn default_batch_size() -> usize { 1000 }
fn default_connect_timeout_secs() -> u64 { 10 }

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            database: String::new(),
            username: String::new(),
            password: String::new(),
            sql_url: None,
            batch_size: default_batch_size(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl CacheConfig {
    /// Connection string handed to the driver.
    ///
    /// Username, password and database are percent-encoded, so values
    /// containing `@`, `#`, `/` or `:` reach the server unchanged. A host
    /// that is not a valid URL host is rejected rather than reinterpreted.
    pub fn connection_url(&self) -> Result<String, ConfigError> {
        if let Some(url) = &self.sql_url {
            return Ok(url.clone());
        }

        let invalid_host = |reason: String| ConfigError::InvalidHost {
            host: self.host.clone(),
            reason,
        };
        if self.host.is_empty() {
            return Err(invalid_host("empty host".to_string()));
        }

        let mut url = Url::parse("mysql://localhost").map_err(|e| ConfigError::InvalidUrl(e.to_string()))?;
        url.set_host(Some(&self.host)).map_err(|e| invalid_host(e.to_string()))?;
        // `set_host` parses only up to a delimiter; anything it dropped was not a host.
        if url.host_str() != Some(self.host.as_str()) {
            return Err(invalid_host("contains URL delimiters".to_string()));
        }
        url.set_port(Some(self.port))
            .map_err(|()| ConfigError::InvalidUrl("cannot set port".to_string()))?;

        if !self.username.is_empty() {
            url.set_username(&encode(&self.username))
                .map_err(|()| ConfigError::InvalidUrl("cannot set username".to_string()))?;
        }
        if !self.password.is_empty() {
            url.set_password(Some(&encode(&self.password)))
                .map_err(|()| ConfigError::InvalidUrl("cannot set password".to_string()))?;
        }
        url.set_path(&format!("/{}", encode(&self.database)));

        Ok(url.to_string())
    }

    /// URL safe to log (no password).
    #[must_use]
    pub fn redacted_url(&self) -> String {
        match &self.sql_url {
            Some(url) if url.starts_with("sqlite:") => url.clone(),
            Some(_) => "<sql_url>".to_string(),
            None => format!("mysql://{}@{}:{}/{}", self.username, self.host, self.port, self.database),
        }
    }

    #[must_use]
    pub fn is_sqlite(&self) -> bool {
        self.sql_url.as_deref().is_some_and(|u| u.starts_with("sqlite:"))
    }
}

fn encode(value: &str) -> String {
    utf8_percent_encode(value, NON_ALPHANUMERIC).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 3306);
        assert_eq!(config.batch_size, 1000);
        assert!(config.sql_url.is_none());
        assert!(!config.is_sqlite());
    }

    #[test]
    fn test_deserialize_partial() {
        let config: CacheConfig = serde_json::from_value(serde_json::json!({
            "host": "mysql.local",
            "database": "game",
            "username": "root",
            "password": "pw"
        }))
        .unwrap();

        assert_eq!(config.host, "mysql.local");
        assert_eq!(config.port, 3306);
        assert_eq!(config.batch_size, 1000);
    }

    #[test]
    fn test_mysql_url_from_fields() {
        let config = CacheConfig {
            host: "db".into(),
            port: 3307,
            database: "game".into(),
            username: "proxy".into(),
            password: "pw".into(),
            ..Default::default()
        };

        let url = config.connection_url().unwrap();
        assert!(url.starts_with("mysql://"), "{url}");
        assert!(url.contains("proxy:pw@db:3307"), "{url}");
        assert!(url.contains("/game"), "{url}");
    }

    #[test]
    fn test_sql_url_overrides_fields() {
        let config = CacheConfig {
            host: "ignored".into(),
            sql_url: Some("sqlite://players.db?mode=rwc".into()),
            ..Default::default()
        };

        assert_eq!(config.connection_url().unwrap(), "sqlite://players.db?mode=rwc");
        assert!(config.is_sqlite());
    }

    #[test]
    fn test_redacted_url_hides_password() {
        let config = CacheConfig {
            username: "proxy".into(),
            password: "hunter2".into(),
            database: "game".into(),
            ..Default::default()
        };

        assert!(!config.redacted_url().contains("hunter2"));
    }

    #[test]
    fn test_username_with_delimiters_keeps_host() {
        let config = CacheConfig {
            host: "db.internal".into(),
            database: "game".into(),
            username: "mc#admin".into(),
            password: "p@ss/word".into(),
            ..Default::default()
        };

        let url = Url::parse(&config.connection_url().unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("db.internal"));
        assert_eq!(url.port(), Some(3306));
        assert_eq!(url.username(), "mc%23admin");
        assert_eq!(url.password(), Some("p%40ss%2Fword"));
        assert_eq!(url.path(), "/game");
        assert!(url.fragment().is_none());
    }

    #[test]
    fn test_bad_host_is_an_error() {
        for host in ["bad host", "", "db/evil", "db:3307", "user@db"] {
            let config = CacheConfig {
                host: host.into(),
                ..Default::default()
            };
            assert!(
                matches!(config.connection_url(), Err(ConfigError::InvalidHost { .. })),
                "accepted {host:?}"
            );
        }
    }

    #[test]
    fn test_ipv4_host() {
        let config = CacheConfig {
            host: "10.0.0.5".into(),
            ..Default::default()
        };

        let url = Url::parse(&config.connection_url().unwrap()).unwrap();
        assert_eq!(url.host_str(), Some("10.0.0.5"));
    }
}
