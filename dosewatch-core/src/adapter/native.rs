//! Native local notifications: alerts are spooled to durable storage so they
//! outlive the process, and a host notifier displays them when due.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::{AdapterMode, ArmedAlert, ChannelSpec, NotificationAdapter, Notifier, Permission};
use crate::error::{Error, Result};
use crate::store::KeyValueStore;

pub const ARMED_KEY: &str = "native_armed_alerts";
pub const CHANNELS_KEY: &str = "native_notification_channels";
pub const PERMISSION_KEY: &str = "native_notification_permission";

pub struct NativeNotifications {
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    // Serializes read-modify-write of the spool.
    spool: Mutex<()>,
}

impl NativeNotifications {
    pub fn new(store: Arc<dyn KeyValueStore>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            store,
            notifier,
            spool: Mutex::new(()),
        }
    }

    fn permission(&self) -> Result<Permission> {
        let stored = self.store.get_item(PERMISSION_KEY)?;
        Ok(match stored.as_deref().map(str::trim) {
            Some("granted") => Permission::Granted,
            Some("denied") => Permission::Denied,
            _ => Permission::Default,
        })
    }

    fn load_armed(&self) -> Result<Vec<ArmedAlert>> {
        let Some(raw) = self.store.get_item(ARMED_KEY)? else {
            return Ok(Vec::new());
        };
        Ok(serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!(error = %e, "corrupt native alert spool, treating as empty");
            Vec::new()
        }))
    }

    fn save_armed(&self, alerts: &[ArmedAlert]) -> Result<()> {
        let json = serde_json::to_string(alerts)?;
        self.store.set_item(ARMED_KEY, &json)
    }

    fn with_spool<T>(&self, f: impl FnOnce(&mut Vec<ArmedAlert>) -> T) -> Result<T> {
        let _guard = self.spool.lock().unwrap_or_else(|e| e.into_inner());
        let mut alerts = self.load_armed()?;
        let out = f(&mut alerts);
        self.save_armed(&alerts)?;
        Ok(out)
    }
}

#[async_trait]
impl NotificationAdapter for NativeNotifications {
    fn mode(&self) -> AdapterMode {
        AdapterMode::Native
    }

    async fn check_permission(&self) -> Result<Permission> {
        self.permission()
    }

    async fn request_permission(&self) -> Result<Permission> {
        let granted = if self.notifier.available() {
            Permission::Granted
        } else {
            Permission::Denied
        };
        let value = if granted.is_granted() { "granted" } else { "denied" };
        self.store.set_item(PERMISSION_KEY, value)?;
        info!(permission = value, "native notification permission updated");
        Ok(granted)
    }

    async fn ensure_channel(&self, channel: &ChannelSpec) -> Result<()> {
        let mut channels: Vec<ChannelSpec> = match self.store.get_item(CHANNELS_KEY)? {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_default(),
            None => Vec::new(),
        };
        if channels.iter().any(|c| c == channel) {
            return Ok(());
        }
        channels.retain(|c| c.id != channel.id);
        channels.push(channel.clone());
        self.store
            .set_item(CHANNELS_KEY, &serde_json::to_string(&channels)?)?;
        debug!(channel = %channel.id, "notification channel registered");
        Ok(())
    }

    async fn arm(&self, alert: ArmedAlert) -> Result<()> {
        if !self.permission()?.is_granted() {
            return Err(Error::PermissionDenied);
        }
        let id = alert.id;
        let fire_at = alert.fire_at;
        self.with_spool(|alerts| {
            alerts.retain(|a| a.id != alert.id);
            alerts.push(alert);
            alerts.sort_by_key(|a| (a.fire_at, a.id));
        })?;
        debug!(id, %fire_at, "native alert armed");
        Ok(())
    }

    async fn show_now(&self, title: &str, body: &str) -> Result<()> {
        if !self.permission()?.is_granted() {
            return Err(Error::PermissionDenied);
        }
        self.notifier.show(title, body)
    }

    async fn list_armed(&self) -> Result<Vec<ArmedAlert>> {
        let _guard = self.spool.lock().unwrap_or_else(|e| e.into_inner());
        self.load_armed()
    }

    async fn cancel(&self, ids: &[i32]) -> Result<()> {
        let removed = self.with_spool(|alerts| {
            let before = alerts.len();
            alerts.retain(|a| !ids.contains(&a.id));
            before - alerts.len()
        })?;
        debug!(requested = ids.len(), removed, "native alerts cancelled");
        Ok(())
    }

    async fn deliver_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let notifier = self.notifier.clone();
        self.with_spool(|alerts| {
            let mut shown = 0usize;
            alerts.retain(|a| {
                if a.fire_at > now {
                    return true;
                }
                match notifier.show(&a.title, &a.body) {
                    Ok(()) => {
                        shown += 1;
                        false
                    }
                    Err(e) => {
                        warn!(
                            id = a.id,
                            error = %e,
                            "failed to display alert, keeping it armed"
                        );
                        true
                    }
                }
            });
            shown
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::notifier::{CommandNotifier, RecordingNotifier};
    use crate::store::MemoryStore;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 15, 9, 0, 0).unwrap()
    }

    fn alert(id: i32, minutes: i64) -> ArmedAlert {
        ArmedAlert {
            id,
            title: format!("t{id}"),
            body: "b".to_string(),
            fire_at: now() + Duration::minutes(minutes),
            channel: Some("medication-reminders".to_string()),
        }
    }

    async fn granted(store: Arc<MemoryStore>, notifier: Arc<dyn Notifier>) -> NativeNotifications {
        let n = NativeNotifications::new(store, notifier);
        assert_eq!(n.request_permission().await.unwrap(), Permission::Granted);
        n
    }

    #[tokio::test]
    async fn arm_requires_permission() {
        let n = NativeNotifications::new(
            Arc::new(MemoryStore::new()),
            Arc::new(RecordingNotifier::new()),
        );
        assert_eq!(n.check_permission().await.unwrap(), Permission::Default);
        assert!(matches!(n.arm(alert(1, 5)).await, Err(Error::PermissionDenied)));
    }

    #[tokio::test]
    async fn request_denied_without_notifier() {
        let n = NativeNotifications::new(
            Arc::new(MemoryStore::new()),
            Arc::new(CommandNotifier::unavailable()),
        );
        assert_eq!(n.request_permission().await.unwrap(), Permission::Denied);
        assert_eq!(n.check_permission().await.unwrap(), Permission::Denied);
    }

    #[tokio::test]
    async fn spool_survives_new_instance_and_replaces_by_id() {
        let store = Arc::new(MemoryStore::new());
        let n = granted(store.clone(), Arc::new(RecordingNotifier::new())).await;
        n.arm(alert(1, 5)).await.unwrap();
        n.arm(alert(2, 10)).await.unwrap();
        n.arm(alert(1, 30)).await.unwrap();

        let reopened = NativeNotifications::new(store, Arc::new(RecordingNotifier::new()));
        let armed = reopened.list_armed().await.unwrap();
        assert_eq!(armed.len(), 2);
        assert_eq!(armed[0].id, 2);
        assert_eq!(armed[1].fire_at, now() + Duration::minutes(30));
    }

    #[tokio::test]
    async fn cancel_removes_only_given_ids() {
        let n = granted(Arc::new(MemoryStore::new()), Arc::new(RecordingNotifier::new())).await;
        for id in 1..=3 {
            n.arm(alert(id, id.into())).await.unwrap();
        }
        n.cancel(&[1, 3, 99]).await.unwrap();
        let ids: Vec<i32> = n.list_armed().await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(ids, vec![2]);
    }

    #[tokio::test]
    async fn deliver_due_shows_and_disarms() {
        let notifier = Arc::new(RecordingNotifier::new());
        let n = granted(Arc::new(MemoryStore::new()), notifier.clone()).await;
        n.arm(alert(1, -1)).await.unwrap();
        n.arm(alert(2, 0)).await.unwrap();
        n.arm(alert(3, 5)).await.unwrap();

        assert_eq!(n.deliver_due(now()).await.unwrap(), 2);
        assert_eq!(notifier.shown().len(), 2);
        let left: Vec<i32> = n.list_armed().await.unwrap().iter().map(|a| a.id).collect();
        assert_eq!(left, vec![3]);
    }

    #[tokio::test]
    async fn failed_display_keeps_alert() {
        let store = Arc::new(MemoryStore::new());
        store.set_item(PERMISSION_KEY, "granted").unwrap();
        let n = NativeNotifications::new(store, Arc::new(RecordingNotifier::failing()));
        n.arm(alert(1, -1)).await.unwrap();
        assert_eq!(n.deliver_due(now()).await.unwrap(), 0);
        assert_eq!(n.list_armed().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn channel_registered_once() {
        let store = Arc::new(MemoryStore::new());
        let n = NativeNotifications::new(store.clone(), Arc::new(RecordingNotifier::new()));
        let spec = ChannelSpec::medication_reminders();
        n.ensure_channel(&spec).await.unwrap();
        n.ensure_channel(&spec).await.unwrap();
        let raw = store.get_item(CHANNELS_KEY).unwrap().unwrap();
        let channels: Vec<ChannelSpec> = serde_json::from_str(&raw).unwrap();
        assert_eq!(channels, vec![spec]);
    }

    #[tokio::test]
    async fn show_now_is_gated_and_reports_notifier_errors() {
        let store = Arc::new(MemoryStore::new());
        let n = NativeNotifications::new(store.clone(), Arc::new(RecordingNotifier::failing()));
        assert!(matches!(n.show_now("t", "b").await, Err(Error::PermissionDenied)));

        store.set_item(PERMISSION_KEY, "granted").unwrap();
        assert!(matches!(n.show_now("t", "b").await, Err(Error::Notifier(_))));
    }
}
