//! Mensa plan cache
//!
//! Plans are persisted per date as one JSON document named `YYYY-MM-DD.json`
//! inside a single cache location:
//!
//! - [`StorageAdapter`] abstracts the location (directory on disk, memory in tests)
//! - [`PresenceTracker`] remembers which dates are known to exist or not
//! - [`PlanCache`] ties both together and owns the file-naming scheme

mod error;
mod presence;
pub mod storage;
mod store;

pub use error::CacheError;
pub use presence::{Presence, PresenceTracker};
pub use storage::{MemoryStorage, StorageAdapter, StorageError};
pub use store::{PlanCache, entry_name, parse_entry_name};

pub(crate) use store::{
    METRIC_CACHE_PRESENCE_SHORTCUT_TOTAL, METRIC_CACHE_READ_TOTAL, METRIC_CACHE_WRITE_TOTAL,
};
