use thiserror::Error;

use super::storage::StorageError;

/// Faults raised by the plan cache.
///
/// A missing entry is never one of these; lookups report it as `Ok(None)`.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage fault on cache entry `{entry}`")]
    Storage {
        entry: String,
        #[source]
        source: StorageError,
    },
    #[error("failed to list cache entries")]
    List(#[source] StorageError),
    #[error("cache entry `{entry}` does not hold a valid plan list")]
    Decode {
        entry: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode plans for cache entry `{entry}`")]
    Encode {
        entry: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid presence code {code}; expected -1, 0 or 1")]
    InvalidPresence { code: i8 },
}
