//! Intake model and the read-only query surface the engine consumes.
//!
//! Intakes are created and updated by the surrounding application; the engine
//! never mutates them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntakeStatus {
    Pending,
    Taken,
    Skipped,
}

pub const DEFAULT_MEDICATION_NAME: &str = "Medication";
pub const DEFAULT_DOSAGE_LABEL: &str = "1 tablet";

/// One scheduled dose event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Intake {
    pub id: String,
    pub user_id: String,
    #[serde(default)]
    pub medication_id: String,
    #[serde(default)]
    pub medication_name: String,
    /// Strength or posology; `None` falls back to [`DEFAULT_DOSAGE_LABEL`].
    #[serde(default)]
    pub dosage_label: Option<String>,
    /// Stored UTC instant.
    pub scheduled_at: DateTime<Utc>,
    pub status: IntakeStatus,
    /// False once the owning treatment has been stopped.
    #[serde(default = "default_true")]
    pub treatment_active: bool,
}

fn default_true() -> bool {
    true
}

impl Intake {
    pub fn new(
        id: impl Into<String>,
        medication_name: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            user_id: String::new(),
            medication_id: String::new(),
            medication_name: medication_name.into(),
            dosage_label: None,
            scheduled_at,
            status: IntakeStatus::Pending,
            treatment_active: true,
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = user_id.into();
        self
    }

    pub fn with_dosage(mut self, dosage: impl Into<String>) -> Self {
        self.dosage_label = Some(dosage.into());
        self
    }

    pub fn with_status(mut self, status: IntakeStatus) -> Self {
        self.status = status;
        self
    }

    pub fn is_pending(&self) -> bool {
        self.status == IntakeStatus::Pending && self.treatment_active
    }

    pub fn display_name(&self) -> &str {
        if self.medication_name.trim().is_empty() {
            DEFAULT_MEDICATION_NAME
        } else {
            &self.medication_name
        }
    }

    pub fn display_dosage(&self) -> &str {
        self.dosage_label
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(DEFAULT_DOSAGE_LABEL)
    }
}

/// Source of pending intakes.
#[async_trait]
pub trait IntakeStore: Send + Sync {
    /// Pending intakes of active treatments owned by `user_id` with
    /// `from <= scheduled_at <= to`, ordered by instant.
    async fn pending_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Intake>>;
}

/// Apply the store query contract to an in-memory slice.
pub fn select_pending(
    intakes: &[Intake],
    user_id: &str,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> Vec<Intake> {
    let mut out: Vec<Intake> = intakes
        .iter()
        .filter(|i| i.user_id == user_id)
        .filter(|i| i.is_pending())
        .filter(|i| i.scheduled_at >= from && i.scheduled_at <= to)
        .cloned()
        .collect();
    out.sort_by_key(|i| i.scheduled_at);
    out
}

#[derive(Debug, Default)]
pub struct MemoryIntakeStore {
    intakes: Mutex<Vec<Intake>>,
}

impl MemoryIntakeStore {
    pub fn new(intakes: Vec<Intake>) -> Self {
        Self {
            intakes: Mutex::new(intakes),
        }
    }

    pub fn replace(&self, intakes: Vec<Intake>) {
        *self.intakes.lock().unwrap_or_else(|e| e.into_inner()) = intakes;
    }
}

#[async_trait]
impl IntakeStore for MemoryIntakeStore {
    async fn pending_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Intake>> {
        let guard = self.intakes.lock().unwrap_or_else(|e| e.into_inner());
        Ok(select_pending(&guard, user_id, from, to))
    }
}
