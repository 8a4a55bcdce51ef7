//! Narrow storage interface the plan cache is written against.
//!
//! Entries are addressed by a flat file name inside one base location. The
//! directory-backed implementation lives in `infra::storage`; the in-memory
//! one below backs tests and tooling that must not touch the disk.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("entry `{name}` does not exist")]
    NotFound { name: String },
    #[error("invalid entry name `{name}`")]
    InvalidName { name: String },
    #[error("i/o failure on entry `{name}`")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl StorageError {
    /// Whether the entry simply does not exist, as opposed to a fault.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    pub(crate) fn io(name: &str, source: std::io::Error) -> Self {
        Self::Io {
            name: name.to_string(),
            source,
        }
    }
}

#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Read a whole entry. A missing entry yields [`StorageError::NotFound`].
    async fn read(&self, name: &str) -> Result<Bytes, StorageError>;

    /// Replace an entry wholesale. Readers observe either the previous or
    /// the new contents, never a partial write.
    async fn write(&self, name: &str, data: Bytes) -> Result<(), StorageError>;

    /// Names of all entries, in unspecified order.
    async fn list(&self) -> Result<Vec<String>, StorageError>;
}

/// Reject names that would escape the base location.
pub(crate) fn validate_name(name: &str) -> Result<(), StorageError> {
    let invalid = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\', '\0']);
    if invalid {
        return Err(StorageError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(())
}

/// Storage kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: RwLock<BTreeMap<String, Bytes>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the storage with pre-existing entries.
    pub fn with_entries<I, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, Bytes)>,
        N: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, data)| (name.into(), data))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    fn read_entries(&self, op: &'static str) -> RwLockReadGuard<'_, BTreeMap<String, Bytes>> {
        self.entries.read().unwrap_or_else(|poisoned| {
            warn!(target = "mensa::storage", op, "Recovered poisoned memory storage lock");
            poisoned.into_inner()
        })
    }

    fn write_entries(&self, op: &'static str) -> RwLockWriteGuard<'_, BTreeMap<String, Bytes>> {
        self.entries.write().unwrap_or_else(|poisoned| {
            warn!(target = "mensa::storage", op, "Recovered poisoned memory storage lock");
            poisoned.into_inner()
        })
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    async fn read(&self, name: &str) -> Result<Bytes, StorageError> {
        validate_name(name)?;
        self.read_entries("read")
            .get(name)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                name: name.to_string(),
            })
    }

    async fn write(&self, name: &str, data: Bytes) -> Result<(), StorageError> {
        validate_name(name)?;
        self.write_entries("write").insert(name.to_string(), data);
        Ok(())
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        Ok(self.read_entries("list").keys().cloned().collect())
    }
}
