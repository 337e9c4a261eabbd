// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Player record data structure.
//!
//! A [`Record`] is the unit that flows between the cache and the
//! `always_online` table: a username, the last address the player connected
//! from, and the player's stable identifier.

use std::net::Ipv4Addr;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Maximum username length (`name CHAR(16)`).
pub const MAX_USERNAME_LEN: usize = 16;

/// Maximum address length (`ip CHAR(15)`).
pub const MAX_IP_LEN: usize = 15;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("username must not be empty")]
    EmptyUsername,
    #[error("username '{0}' exceeds {} characters", MAX_USERNAME_LEN)]
    UsernameTooLong(String),
    #[error("username '{0}' contains characters outside [A-Za-z0-9_]")]
    UsernameCharset(String),
    #[error("'{0}' is not a dotted-quad address")]
    InvalidIp(String),
}

/// A player's last known address and identifier.
///
/// Records are immutable: an update builds a new value and replaces the old
/// one in the cache.
///
/// # Example
///
/// ```
/// use always_online::Record;
/// use uuid::Uuid;
///
/// let id = Uuid::new_v4();
/// let record = Record::new("Notch", "10.0.0.7", id);
///
/// assert_eq!(record.username(), "Notch");
/// assert_eq!(record.ip(), "10.0.0.7");
/// assert!(record.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    username: String,
    ip: String,
    id: Uuid,
}

impl Record {
    /// Build a record without validation.
    ///
    /// The cache accepts any value; validation happens before persisting.
    pub fn new(username: impl Into<String>, ip: impl Into<String>, id: Uuid) -> Self {
        Self {
            username: username.into(),
            ip: ip.into(),
            id,
        }
    }

    /// Build a record, rejecting values the table cannot hold.
    pub fn try_new(
        username: impl Into<String>,
        ip: impl Into<String>,
        id: Uuid,
    ) -> Result<Self, RecordError> {
        let record = Self::new(username, ip, id);
        record.validate()?;
        Ok(record)
    }

    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    #[must_use]
    pub fn ip(&self) -> &str {
        &self.ip
    }

    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Canonical 36-char hyphenated form, as stored in the `uuid` column.
    #[must_use]
    pub fn id_string(&self) -> String {
        self.id.hyphenated().to_string()
    }

    pub fn validate(&self) -> Result<(), RecordError> {
        validate_username(&self.username)?;
        validate_ip(&self.ip)
    }
}

pub fn validate_username(username: &str) -> Result<(), RecordError> {
    if username.is_empty() {
        return Err(RecordError::EmptyUsername);
    }
    if username.chars().count() > MAX_USERNAME_LEN {
        return Err(RecordError::UsernameTooLong(username.to_string()));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(RecordError::UsernameCharset(username.to_string()));
    }
    Ok(())
}

pub fn validate_ip(ip: &str) -> Result<(), RecordError> {
    if ip.len() > MAX_IP_LEN || ip.parse::<Ipv4Addr>().is_err() {
        return Err(RecordError::InvalidIp(ip.to_string()));
    }
    Ok(())
}
