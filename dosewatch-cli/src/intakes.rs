//! Intake source backed by a JSON file (an array of intakes).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dosewatch_core::intake::select_pending;
use dosewatch_core::{Error, Intake, IntakeStore};
use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;
use tracing::debug;

pub struct JsonIntakeStore {
    path: PathBuf,
}

impl JsonIntakeStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Read every intake in the file. A missing file reads as empty.
    pub fn read_all(&self) -> dosewatch_core::Result<Vec<Intake>> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no intakes file");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(Error::Query(format!("read {}: {e}", self.path.display())));
            }
        };
        serde_json::from_str(&raw)
            .map_err(|e| Error::Query(format!("parse {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl IntakeStore for JsonIntakeStore {
    async fn pending_between(
        &self,
        user_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> dosewatch_core::Result<Vec<Intake>> {
        let all = self.read_all()?;
        Ok(select_pending(&all, user_id, from, to))
    }
}
