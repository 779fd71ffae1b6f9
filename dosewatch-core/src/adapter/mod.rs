//! Notification adapters.
//!
//! The engine only talks to [`NotificationAdapter`]. Two backends exist:
//! [`NativeNotifications`] (durable, survives restarts like OS local
//! notifications) and [`WebNotifications`] (session-scoped, like the browser
//! Notification API). [`select::detect`] picks one at startup.

pub mod native;
pub mod notifier;
pub mod select;
pub mod web;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::Result;

pub use native::NativeNotifications;
pub use notifier::{CommandNotifier, Notifier, RecordingNotifier};
pub use select::{EnvProbe, HostProbe, NotificationSystem, detect, is_mobile_user_agent};
pub use web::WebNotifications;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Default,
    Denied,
}

impl Permission {
    pub fn is_granted(self) -> bool {
        self == Permission::Granted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterMode {
    Native,
    Web,
}

impl fmt::Display for AdapterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterMode::Native => f.write_str("native"),
            AdapterMode::Web => f.write_str("web"),
        }
    }
}

/// Delivery channel for native alerts (Android-style notification channel).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelSpec {
    pub id: String,
    pub name: String,
    pub description: String,
    /// 1 (min) to 5 (max).
    pub importance: u8,
    pub sound: Option<String>,
    pub vibration: bool,
}

impl ChannelSpec {
    pub fn medication_reminders() -> Self {
        Self {
            id: "medication-reminders".to_string(),
            name: "Medication reminders".to_string(),
            description: "Reminders for your scheduled doses".to_string(),
            importance: 5,
            sound: Some("beep.wav".to_string()),
            vibration: true,
        }
    }
}

/// A one-shot alert registered with an adapter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedAlert {
    pub id: i32,
    pub title: String,
    pub body: String,
    pub fire_at: DateTime<Utc>,
    pub channel: Option<String>,
}

#[async_trait]
pub trait NotificationAdapter: Send + Sync {
    fn mode(&self) -> AdapterMode;

    async fn check_permission(&self) -> Result<Permission>;

    async fn request_permission(&self) -> Result<Permission>;

    /// Register a delivery channel. Backends without channels do nothing.
    async fn ensure_channel(&self, channel: &ChannelSpec) -> Result<()>;

    /// Arm a one-shot alert. Arming an id that is already armed replaces it.
    async fn arm(&self, alert: ArmedAlert) -> Result<()>;

    async fn list_armed(&self) -> Result<Vec<ArmedAlert>>;

    /// Cancel the given ids. Unknown ids are ignored.
    async fn cancel(&self, ids: &[i32]) -> Result<()>;

    /// Display one notification right away. Requires granted permission.
    async fn show_now(&self, title: &str, body: &str) -> Result<()>;

    /// Show every armed alert due at `now` and disarm it. Returns how many were shown.
    async fn deliver_due(&self, now: DateTime<Utc>) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&AdapterMode::Web).unwrap(), "\"web\"");
        assert_eq!(AdapterMode::Native.to_string(), "native");
    }

    #[test]
    fn medication_channel_is_max_importance() {
        let c = ChannelSpec::medication_reminders();
        assert_eq!(c.id, "medication-reminders");
        assert_eq!(c.importance, 5);
    }
}
