//! Startup detection of the notification backend.

use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{info, warn};

use super::{
    AdapterMode, CommandNotifier, NativeNotifications, NotificationAdapter, Notifier, Permission,
    WebNotifications,
};
use crate::error::Result;
use crate::store::KeyValueStore;

/// What the host runtime offers. Probing may fail; that is not fatal.
pub trait HostProbe {
    /// Whether native local-notification primitives exist (permission aside).
    fn native_primitives(&self) -> Result<bool>;

    fn user_agent(&self) -> Option<String>;

    /// Whether a browser-style Notification API exists.
    fn web_notifications(&self) -> bool;

    /// Permission the browser-style API already holds.
    fn web_permission(&self) -> Permission {
        Permission::Default
    }
}

/// The backend chosen for this session. Read-only once built.
#[derive(Clone)]
pub struct NotificationSystem {
    pub mode: AdapterMode,
    pub is_supported: bool,
    pub adapter: Arc<dyn NotificationAdapter>,
}

impl std::fmt::Debug for NotificationSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationSystem")
            .field("mode", &self.mode)
            .field("is_supported", &self.is_supported)
            .finish_non_exhaustive()
    }
}

pub fn is_mobile_user_agent(ua: &str) -> bool {
    static MOBILE: OnceLock<Option<Regex>> = OnceLock::new();
    MOBILE
        .get_or_init(|| Regex::new(r"(?i)android|iphone|ipad|ipod|mobile").ok())
        .as_ref()
        .is_some_and(|re| re.is_match(ua))
}

/// Pick the notification backend. Never fails.
///
/// Native wins when the host has native primitives or looks like a mobile OS;
/// a probe error degrades to an unsupported web backend.
pub fn detect(
    probe: &dyn HostProbe,
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
) -> NotificationSystem {
    let native = match probe.native_primitives() {
        Ok(native) => native,
        Err(e) => {
            warn!(error = %e, "notification probe failed, falling back to web (unsupported)");
            return NotificationSystem {
                mode: AdapterMode::Web,
                is_supported: false,
                adapter: Arc::new(WebNotifications::new(false, Permission::Default, notifier)),
            };
        }
    };
    let mobile = probe
        .user_agent()
        .as_deref()
        .is_some_and(is_mobile_user_agent);

    let system = if native || mobile {
        NotificationSystem {
            mode: AdapterMode::Native,
            is_supported: native,
            adapter: Arc::new(NativeNotifications::new(store, notifier)),
        }
    } else {
        let supported = probe.web_notifications();
        NotificationSystem {
            mode: AdapterMode::Web,
            is_supported: supported,
            adapter: Arc::new(WebNotifications::new(
                supported,
                probe.web_permission(),
                notifier,
            )),
        }
    };
    info!(mode = %system.mode, supported = system.is_supported, "notification system detected");
    system
}

/// Probe for a desktop host.
///
/// Native primitives are a notifier command on `PATH`. `DOSEWATCH_USER_AGENT`,
/// `DOSEWATCH_WEB_NOTIFICATIONS` and `DOSEWATCH_WEB_PERMISSION` describe an
/// embedding browser; `DOSEWATCH_FORCE_MODE=native|web` overrides detection.
#[derive(Debug, Clone)]
pub struct EnvProbe {
    notifier: CommandNotifier,
}

impl EnvProbe {
    pub fn new(notifier: CommandNotifier) -> Self {
        Self { notifier }
    }

    fn forced(&self) -> Option<AdapterMode> {
        match std::env::var("DOSEWATCH_FORCE_MODE").ok()?.trim() {
            "native" => Some(AdapterMode::Native),
            "web" => Some(AdapterMode::Web),
            _ => None,
        }
    }
}

impl HostProbe for EnvProbe {
    fn native_primitives(&self) -> Result<bool> {
        Ok(match self.forced() {
            Some(AdapterMode::Native) => true,
            Some(AdapterMode::Web) => false,
            None => self.notifier.available(),
        })
    }

    fn user_agent(&self) -> Option<String> {
        if self.forced() == Some(AdapterMode::Web) {
            return None;
        }
        std::env::var("DOSEWATCH_USER_AGENT").ok()
    }

    fn web_notifications(&self) -> bool {
        if self.forced() == Some(AdapterMode::Web) {
            return true;
        }
        matches!(
            std::env::var("DOSEWATCH_WEB_NOTIFICATIONS").as_deref(),
            Ok("1") | Ok("true")
        )
    }

    fn web_permission(&self) -> Permission {
        match std::env::var("DOSEWATCH_WEB_PERMISSION").as_deref() {
            Ok("granted") => Permission::Granted,
            Ok("denied") => Permission::Denied,
            _ => Permission::Default,
        }
    }
}
