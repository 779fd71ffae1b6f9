//! Browser-style notifications: everything lives for the session only.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

use super::{AdapterMode, ArmedAlert, ChannelSpec, NotificationAdapter, Notifier, Permission};
use crate::error::{Error, Result};

pub struct WebNotifications {
    supported: bool,
    permission: Mutex<Permission>,
    armed: Mutex<BTreeMap<i32, ArmedAlert>>,
    notifier: Arc<dyn Notifier>,
}

impl WebNotifications {
    pub fn new(supported: bool, permission: Permission, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            supported,
            permission: Mutex::new(permission),
            armed: Mutex::new(BTreeMap::new()),
            notifier,
        }
    }

    fn current_permission(&self) -> Permission {
        *self.permission.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn armed(&self) -> std::sync::MutexGuard<'_, BTreeMap<i32, ArmedAlert>> {
        self.armed.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl NotificationAdapter for WebNotifications {
    fn mode(&self) -> AdapterMode {
        AdapterMode::Web
    }

    async fn check_permission(&self) -> Result<Permission> {
        Ok(self.current_permission())
    }

    async fn request_permission(&self) -> Result<Permission> {
        if !self.supported {
            return Err(Error::AdapterUnavailable(
                "notifications are not supported by this host".to_string(),
            ));
        }
        let next = if self.notifier.available() {
            Permission::Granted
        } else {
            Permission::Denied
        };
        *self.permission.lock().unwrap_or_else(|e| e.into_inner()) = next;
        Ok(next)
    }

    async fn ensure_channel(&self, _channel: &ChannelSpec) -> Result<()> {
        Ok(())
    }

    async fn arm(&self, alert: ArmedAlert) -> Result<()> {
        if !self.supported {
            return Err(Error::AdapterUnavailable("web notifications".to_string()));
        }
        if !self.current_permission().is_granted() {
            return Err(Error::PermissionDenied);
        }
        debug!(id = alert.id, fire_at = %alert.fire_at, "session alert armed");
        self.armed().insert(alert.id, alert);
        Ok(())
    }

    async fn show_now(&self, title: &str, body: &str) -> Result<()> {
        if !self.supported {
            return Err(Error::AdapterUnavailable("web notifications".to_string()));
        }
        if !self.current_permission().is_granted() {
            return Err(Error::PermissionDenied);
        }
        self.notifier.show(title, body)
    }

    async fn list_armed(&self) -> Result<Vec<ArmedAlert>> {
        let mut out: Vec<ArmedAlert> = self.armed().values().cloned().collect();
        out.sort_by_key(|a| (a.fire_at, a.id));
        Ok(out)
    }

    async fn cancel(&self, ids: &[i32]) -> Result<()> {
        let mut armed = self.armed();
        for id in ids {
            armed.remove(id);
        }
        Ok(())
    }

    async fn deliver_due(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut armed = self.armed();
        let due: Vec<i32> = armed
            .values()
            .filter(|a| a.fire_at <= now)
            .map(|a| a.id)
            .collect();
        let mut shown = 0;
        for id in due {
            let Some(alert) = armed.get(&id) else { continue };
            match self.notifier.show(&alert.title, &alert.body) {
                Ok(()) => {
                    armed.remove(&id);
                    shown += 1;
                }
                Err(e) => warn!(id, error = %e, "failed to display alert, keeping it armed"),
            }
        }
        Ok(shown)
    }
}
