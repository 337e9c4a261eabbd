// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! In-memory record map.

use dashmap::DashMap;
use crate::record::Record;

/// Concurrent username → [`Record`] map.
///
/// Point operations are linearizable per key. [`snapshot`](Self::snapshot)
/// is consistent per entry only: updates racing with it may or may not show.
pub struct RecordCache {
    data: DashMap<String, Record>,
}

impl RecordCache {
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: DashMap::new(),
        }
    }

    #[must_use]
    pub fn get(&self, username: &str) -> Option<Record> {
        self.data.get(username).map(|r| r.value().clone())
    }

    /// Store `record`, replacing any previous value for its username.
    pub fn put(&self, record: Record) {
        self.data.insert(record.username().to_string(), record);
    }

    /// Store `record` only if nothing is cached for its username.
    ///
    /// Returns whichever record is cached afterwards.
    pub fn put_if_absent(&self, record: Record) -> Record {
        self.data
            .entry(record.username().to_string())
            .or_insert(record)
            .value()
            .clone()
    }

    /// Clear all records
    pub fn clear(&self) {
        self.data.clear();
    }

    /// Copy of every entry, in iteration order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Record> {
        self.data.iter().map(|r| r.value().clone()).collect()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl Default for RecordCache {
    fn default() -> Self {
        Self::new()
    }
}
