//! Reminder preferences and their durable repository.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::store::KeyValueStore;

pub const PREFERENCES_KEY: &str = "notificationPreferences";

/// Offsets are clamped to this many minutes when windows are computed.
pub const MAX_OFFSET_MINUTES: u32 = 120;

/// Stored under the same field names the rest of the app uses for this key.
/// Fields the engine does not own (stock, renewal and pharmacy alerts, custom
/// messages) are kept in `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    #[serde(rename = "pushEnabled")]
    pub push_enabled: bool,
    #[serde(rename = "medicationReminders")]
    pub medication_reminders_enabled: bool,
    /// Minutes before the dose; 0 disables the window.
    #[serde(rename = "medicationReminderBefore")]
    pub before_offset_minutes: u32,
    /// Minutes after the dose; 0 disables the window.
    #[serde(rename = "medicationReminderDelay")]
    pub after_offset_minutes: u32,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            push_enabled: true,
            medication_reminders_enabled: true,
            before_offset_minutes: 5,
            after_offset_minutes: 10,
            extra: Map::new(),
        }
    }
}

impl Preferences {
    pub fn reminders_on(&self) -> bool {
        self.push_enabled && self.medication_reminders_enabled
    }

    pub fn before_minutes(&self) -> u32 {
        self.before_offset_minutes.min(MAX_OFFSET_MINUTES)
    }

    pub fn after_minutes(&self) -> u32 {
        self.after_offset_minutes.min(MAX_OFFSET_MINUTES)
    }

    pub fn apply(&mut self, patch: &PreferencePatch) {
        if let Some(v) = patch.push_enabled {
            self.push_enabled = v;
        }
        if let Some(v) = patch.medication_reminders_enabled {
            self.medication_reminders_enabled = v;
        }
        if let Some(v) = patch.before_offset_minutes {
            self.before_offset_minutes = v;
        }
        if let Some(v) = patch.after_offset_minutes {
            self.after_offset_minutes = v;
        }
    }
}

/// Partial update; `None` fields keep their current value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreferencePatch {
    pub push_enabled: Option<bool>,
    pub medication_reminders_enabled: Option<bool>,
    pub before_offset_minutes: Option<u32>,
    pub after_offset_minutes: Option<u32>,
}

impl PreferencePatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Whether applying this patch to `current` changes a field that gates scheduling.
    pub fn touches_gating(&self, current: &Preferences) -> bool {
        self.push_enabled.is_some_and(|v| v != current.push_enabled)
            || self
                .medication_reminders_enabled
                .is_some_and(|v| v != current.medication_reminders_enabled)
    }
}

/// Loads and saves [`Preferences`] under [`PREFERENCES_KEY`].
pub struct PreferenceRepository {
    store: Arc<dyn KeyValueStore>,
    current: Preferences,
}

impl PreferenceRepository {
    /// Open the repository and load the stored value.
    pub fn open(store: Arc<dyn KeyValueStore>) -> Self {
        let current = load_from(store.as_ref());
        Self { store, current }
    }

    pub fn current(&self) -> Preferences {
        self.current.clone()
    }

    /// Re-read from storage. Never fails.
    pub fn load(&mut self) -> Preferences {
        self.current = load_from(self.store.as_ref());
        self.current.clone()
    }

    /// Merge `patch` into the current value and write it back.
    ///
    /// The in-memory value changes even if the write fails; the failure is logged.
    pub fn save(&mut self, patch: &PreferencePatch) -> Preferences {
        self.current.apply(patch);
        match serde_json::to_string(&self.current) {
            Ok(json) => {
                if let Err(e) = self.store.set_item(PREFERENCES_KEY, &json) {
                    warn!(error = %e, "failed to persist reminder preferences");
                }
            }
            Err(e) => warn!(error = %e, "failed to serialize reminder preferences"),
        }
        self.current.clone()
    }
}

fn load_from(store: &dyn KeyValueStore) -> Preferences {
    let raw = match store.get_item(PREFERENCES_KEY) {
        Ok(Some(raw)) => raw,
        Ok(None) => {
            debug!("no stored reminder preferences, using defaults");
            return Preferences::default();
        }
        Err(e) => {
            warn!(error = %e, "cannot read reminder preferences, using defaults");
            return Preferences::default();
        }
    };
    serde_json::from_str(&raw).unwrap_or_else(|e| {
        warn!(error = %e, "corrupt reminder preferences, using defaults");
        Preferences::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    #[test]
    fn defaults_when_missing() {
        let repo = PreferenceRepository::open(Arc::new(MemoryStore::new()));
        let p = repo.current();
        assert!(p.push_enabled && p.medication_reminders_enabled);
        assert_eq!(p.before_offset_minutes, 5);
        assert_eq!(p.after_offset_minutes, 10);
    }

    #[test]
    fn defaults_when_corrupt() {
        let store = Arc::new(MemoryStore::new());
        store.set_item(PREFERENCES_KEY, "{not json").unwrap();
        let repo = PreferenceRepository::open(store);
        assert_eq!(repo.current(), Preferences::default());
    }

    #[test]
    fn partial_payload_keeps_other_defaults() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_item(PREFERENCES_KEY, r#"{"medicationReminderBefore": 0, "stockAlerts": true}"#)
            .unwrap();
        let repo = PreferenceRepository::open(store);
        let p = repo.current();
        assert_eq!(p.before_offset_minutes, 0);
        assert_eq!(p.after_offset_minutes, 10);
    }

    #[test]
    fn save_merges_and_persists() {
        let store = Arc::new(MemoryStore::new());
        let mut repo = PreferenceRepository::open(store.clone());
        repo.save(&PreferencePatch {
            after_offset_minutes: Some(30),
            ..Default::default()
        });

        let reopened = PreferenceRepository::open(store);
        assert_eq!(reopened.current().after_offset_minutes, 30);
        assert_eq!(reopened.current().before_offset_minutes, 5);
    }

    #[test]
    fn save_keeps_fields_it_does_not_own() {
        let store = Arc::new(MemoryStore::new());
        store
            .set_item(
                PREFERENCES_KEY,
                r#"{"pushEnabled": true, "medicationReminders": true,
                    "medicationReminderBefore": 5, "medicationReminderDelay": 10,
                    "stockAlerts": false, "pharmacyVisitReminderDays": 3,
                    "customMessages": {"stockAlert": "Low stock"}}"#,
            )
            .unwrap();
        let mut repo = PreferenceRepository::open(store.clone());
        repo.save(&PreferencePatch {
            after_offset_minutes: Some(20),
            ..Default::default()
        });

        let raw = store.get_item(PREFERENCES_KEY).unwrap().unwrap();
        let stored: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored["medicationReminderDelay"], 20);
        assert_eq!(stored["medicationReminders"], true);
        assert_eq!(stored["stockAlerts"], false);
        assert_eq!(stored["pharmacyVisitReminderDays"], 3);
        assert_eq!(stored["customMessages"]["stockAlert"], "Low stock");
        assert!(stored.get("afterOffsetMinutes").is_none());
    }

    #[test]
    fn load_rereads_the_store() {
        let store = Arc::new(MemoryStore::new());
        let mut repo = PreferenceRepository::open(store.clone());
        store
            .set_item(PREFERENCES_KEY, r#"{"medicationReminders": false}"#)
            .unwrap();
        assert!(repo.current().medication_reminders_enabled);
        assert!(!repo.load().medication_reminders_enabled);
    }

    #[test]
    fn out_of_range_offsets_are_stored_but_clamped_on_use() {
        let mut repo = PreferenceRepository::open(Arc::new(MemoryStore::new()));
        let p = repo.save(&PreferencePatch {
            before_offset_minutes: Some(500),
            ..Default::default()
        });
        assert_eq!(p.before_offset_minutes, 500);
        assert_eq!(p.before_minutes(), MAX_OFFSET_MINUTES);
    }

    #[test]
    fn gating_detection() {
        let current = Preferences::default();
        let offsets_only = PreferencePatch {
            before_offset_minutes: Some(15),
            ..Default::default()
        };
        assert!(!offsets_only.touches_gating(&current));

        let same_value = PreferencePatch {
            push_enabled: Some(true),
            ..Default::default()
        };
        assert!(!same_value.touches_gating(&current));

        let flip = PreferencePatch {
            medication_reminders_enabled: Some(false),
            ..Default::default()
        };
        assert!(flip.touches_gating(&current));
    }
}
