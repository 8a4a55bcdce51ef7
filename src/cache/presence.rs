//! Advisory record of which cache keys are known to exist on storage.

use std::hash::Hash;

use dashmap::DashMap;

use super::error::CacheError;

/// Tri-state knowledge about a cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Presence {
    /// Nothing recorded.
    #[default]
    Unknown,
    /// Confirmed missing from storage.
    Absent,
    /// Confirmed durably stored.
    Present,
}

impl Presence {
    /// Numeric code: `-1` absent, `0` unknown, `1` present.
    pub const fn code(self) -> i8 {
        match self {
            Presence::Absent => -1,
            Presence::Unknown => 0,
            Presence::Present => 1,
        }
    }
}

impl TryFrom<i8> for Presence {
    type Error = CacheError;

    fn try_from(code: i8) -> Result<Self, Self::Error> {
        match code {
            -1 => Ok(Presence::Absent),
            0 => Ok(Presence::Unknown),
            1 => Ok(Presence::Present),
            code => Err(CacheError::InvalidPresence { code }),
        }
    }
}

/// Concurrent map from key to [`Presence`]; unknown keys take no memory.
#[derive(Debug)]
pub struct PresenceTracker<K>
where
    K: Eq + Hash,
{
    entries: DashMap<K, Presence>,
}

impl<K> Default for PresenceTracker<K>
where
    K: Eq + Hash,
{
    fn default() -> Self {
        Self {
            entries: DashMap::new(),
        }
    }
}

impl<K> PresenceTracker<K>
where
    K: Eq + Hash,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &K) -> Presence {
        self.entries
            .get(key)
            .map(|entry| *entry.value())
            .unwrap_or_default()
    }

    /// Record `presence` for `key`; [`Presence::Unknown`] forgets the key.
    pub fn set(&self, key: K, presence: Presence) {
        match presence {
            Presence::Unknown => {
                self.entries.remove(&key);
            }
            known => {
                self.entries.insert(key, known);
            }
        }
    }

    /// Record [`Presence::Absent`] only if nothing is recorded for `key`.
    ///
    /// A miss observed by a reader must not override a `Present` recorded by
    /// a writer that finished in the meantime. Returns the value now held.
    pub fn mark_absent_if_unknown(&self, key: K) -> Presence {
        *self.entries.entry(key).or_insert(Presence::Absent)
    }

    /// Drop every `Absent` record whose key fails `keep`.
    pub fn forget_absent(&self, mut keep: impl FnMut(&K) -> bool) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|key, presence| *presence != Presence::Absent || keep(key));
        before.saturating_sub(self.entries.len())
    }

    /// Record a raw presence code, rejecting anything but `-1`, `0` and `1`.
    pub fn set_code(&self, key: K, code: i8) -> Result<(), CacheError> {
        let presence = Presence::try_from(code)?;
        self.set(key, presence);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
