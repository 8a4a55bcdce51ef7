//! Date-indexed plan cache: one JSON file per date, fronted by a presence tracker.

use std::sync::Arc;

use bytes::Bytes;
use metrics::counter;
use tracing::debug;

use crate::domain::date::DateKey;
use crate::domain::plans::PlanRecord;

use super::error::CacheError;
use super::presence::{Presence, PresenceTracker};
use super::storage::StorageAdapter;

const ENTRY_SUFFIX: &str = ".json";

pub(crate) const METRIC_CACHE_READ_TOTAL: &str = "mensa_cache_read_total";
pub(crate) const METRIC_CACHE_PRESENCE_SHORTCUT_TOTAL: &str = "mensa_cache_presence_shortcut_total";
pub(crate) const METRIC_CACHE_WRITE_TOTAL: &str = "mensa_cache_write_total";

/// Name of the storage entry holding the plans for `date`.
pub fn entry_name(date: &DateKey) -> String {
    format!("{date}{ENTRY_SUFFIX}")
}

/// Inverse of [`entry_name`]; `None` for any name it could not have produced.
pub fn parse_entry_name(name: &str) -> Option<DateKey> {
    name.strip_suffix(ENTRY_SUFFIX)?.parse().ok()
}

/// Persistent store of date → plans.
///
/// Only "entry does not exist" is reported as a miss (`Ok(None)`); every
/// other storage or decoding failure surfaces as a [`CacheError`].
pub struct PlanCache {
    storage: Arc<dyn StorageAdapter>,
    presence: Option<PresenceTracker<DateKey>>,
}

impl PlanCache {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            presence: Some(PresenceTracker::new()),
        }
    }

    /// A cache that always consults storage.
    pub fn without_presence_tracking(storage: Arc<dyn StorageAdapter>) -> Self {
        Self {
            storage,
            presence: None,
        }
    }

    /// What the presence tracker currently knows about `date`.
    pub fn presence(&self, date: &DateKey) -> Presence {
        self.presence
            .as_ref()
            .map(|tracker| tracker.get(date))
            .unwrap_or_default()
    }

    fn record(&self, date: &DateKey, presence: Presence) {
        if let Some(tracker) = &self.presence {
            tracker.set(*date, presence);
        }
    }

    /// Forget absent markers for dates outside `keep`, so lookups of those
    /// dates read storage again. Present markers are never dropped.
    pub fn forget_absent(&self, keep: impl FnMut(&DateKey) -> bool) -> usize {
        self.presence
            .as_ref()
            .map_or(0, |tracker| tracker.forget_absent(keep))
    }

    /// Load the plans stored for `date`, or `None` if nothing is stored.
    pub async fn get(&self, date: &DateKey) -> Result<Option<Vec<PlanRecord>>, CacheError> {
        if self.presence(date) == Presence::Absent {
            counter!(METRIC_CACHE_PRESENCE_SHORTCUT_TOTAL).increment(1);
            return Ok(None);
        }

        let entry = entry_name(date);
        let contents = match self.storage.read(&entry).await {
            Ok(contents) => contents,
            Err(err) if err.is_not_found() => {
                debug!(target = "mensa::cache", entry, "cache miss");
                counter!(METRIC_CACHE_READ_TOTAL, "outcome" => "miss").increment(1);
                if let Some(tracker) = &self.presence {
                    tracker.mark_absent_if_unknown(*date);
                }
                return Ok(None);
            }
            Err(source) => return Err(CacheError::Storage { entry, source }),
        };

        let plans: Vec<PlanRecord> = serde_json::from_slice(&contents)
            .map_err(|source| CacheError::Decode {
                entry: entry.clone(),
                source,
            })?;

        counter!(METRIC_CACHE_READ_TOTAL, "outcome" => "hit").increment(1);
        self.record(date, Presence::Present);
        Ok(Some(plans))
    }

    /// Replace whatever is stored for `date` with `plans`.
    pub async fn put(&self, date: &DateKey, plans: &[PlanRecord]) -> Result<(), CacheError> {
        let entry = entry_name(date);
        let encoded = serde_json::to_vec(plans).map_err(|source| CacheError::Encode {
            entry: entry.clone(),
            source,
        })?;

        self.storage
            .write(&entry, Bytes::from(encoded))
            .await
            .map_err(|source| CacheError::Storage {
                entry: entry.clone(),
                source,
            })?;

        debug!(target = "mensa::cache", entry, plans = plans.len(), "cache entry written");
        counter!(METRIC_CACHE_WRITE_TOTAL).increment(1);
        self.record(date, Presence::Present);
        Ok(())
    }

    /// Every date with a stored entry, in chronological order.
    ///
    /// Entries whose names are not exactly `YYYY-MM-DD.json` for a real
    /// calendar date are ignored.
    pub async fn list(&self) -> Result<Vec<DateKey>, CacheError> {
        let names = self.storage.list().await.map_err(CacheError::List)?;
        let mut dates: Vec<DateKey> = names
            .iter()
            .filter_map(|name| parse_entry_name(name))
            .collect();
        dates.sort_unstable();
        Ok(dates)
    }
}
