//! Dedup cache: the set of reminder windows already handed to the adapter.
//!
//! Keys are `"{intake_id}_{fire_at_epoch_millis}"`. The epoch is read from the
//! text after the last underscore, so intake ids may contain underscores.

use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::store::KeyValueStore;

pub const CACHE_KEY: &str = "scheduled_notifications_cache";
pub const DEFAULT_RETENTION_HOURS: i64 = 48;

pub fn key_for(intake_id: &str, fire_at: DateTime<Utc>) -> String {
    format!("{intake_id}_{}", fire_at.timestamp_millis())
}

/// Epoch millis embedded in a key, if it parses.
pub fn key_epoch_millis(key: &str) -> Option<i64> {
    let (_, suffix) = key.rsplit_once('_')?;
    suffix.parse().ok()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DedupCache {
    keys: BTreeSet<String>,
}

impl DedupCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, key: &str) -> bool {
        self.keys.contains(key)
    }

    pub fn add(&mut self, key: impl Into<String>) {
        self.keys.insert(key.into());
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Drop every key whose embedded instant is older than `now - age`.
    /// Keys without a parseable instant are dropped too. Returns how many went.
    pub fn sweep_older_than(&mut self, now: DateTime<Utc>, age: Duration) -> usize {
        let Some(cutoff) = now.checked_sub_signed(age).map(|t| t.timestamp_millis()) else {
            warn!(%age, "retention overflows the calendar, sweep skipped");
            return 0;
        };
        let before = self.keys.len();
        self.keys
            .retain(|k| key_epoch_millis(k).is_some_and(|ms| ms >= cutoff));
        let removed = before - self.keys.len();
        if removed > 0 {
            debug!(removed, remaining = self.keys.len(), "swept stale reminder keys");
        }
        removed
    }

    /// Forget everything. Only a manual full reschedule does this.
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Write the set as a JSON array under [`CACHE_KEY`].
    pub fn persist(&self, store: &dyn KeyValueStore) -> Result<()> {
        let json = serde_json::to_string(&self.keys)?;
        store
            .set_item(CACHE_KEY, &json)
            .map_err(|e| Error::CachePersist(Box::new(e)))
    }

    /// Read the set back. Missing or corrupt payloads give an empty cache.
    pub fn restore(store: &dyn KeyValueStore) -> Self {
        let raw = match store.get_item(CACHE_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return Self::new(),
            Err(e) => {
                warn!(error = %e, "cannot read reminder cache, starting empty");
                return Self::new();
            }
        };
        match serde_json::from_str::<Vec<String>>(&raw) {
            Ok(keys) => {
                debug!(entries = keys.len(), "reminder cache restored");
                Self {
                    keys: keys.into_iter().collect(),
                }
            }
            Err(e) => {
                warn!(error = %e, "corrupt reminder cache, starting empty");
                Self::new()
            }
        }
    }

    /// Remove the durable copy.
    pub fn forget(store: &dyn KeyValueStore) -> Result<()> {
        store.remove_item(CACHE_KEY)
    }
}
