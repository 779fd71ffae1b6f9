//! Scheduling orchestrator: decides when to compile and arm, and owns the
//! dedup cache for the lifetime of the process.
//!
//! Triggers are discrete (mount, preference change, permission grant, manual
//! reschedule). There is no timer loop. Every trigger takes `&mut self`, so two
//! passes can never run against the same cache.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::adapter::{AdapterMode, ArmedAlert, ChannelSpec, NotificationSystem, Permission};
use crate::dedup::{DEFAULT_RETENTION_HOURS, DedupCache};
use crate::diagnostics::{Reporter, Toast, ToastLevel};
use crate::error::Error;
use crate::intake::IntakeStore;
use crate::preferences::{PreferencePatch, PreferenceRepository, Preferences};
use crate::reminders::{DEFAULT_LOOKAHEAD_HOURS, compile_intake};
use crate::store::KeyValueStore;
use crate::time::CivilClock;

pub const TEST_NOTIFICATION_TITLE: &str = "💊 Test notification";
pub const TEST_NOTIFICATION_BODY: &str = "Notifications are working!";

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub clock: CivilClock,
    /// How far ahead intakes are considered.
    pub lookahead: Duration,
    /// Dedup keys older than this are swept.
    pub retention: Duration,
    pub channel: ChannelSpec,
}

impl EngineConfig {
    pub fn new(clock: CivilClock) -> Self {
        Self {
            clock,
            lookahead: Duration::hours(DEFAULT_LOOKAHEAD_HOURS),
            retention: Duration::hours(DEFAULT_RETENTION_HOURS),
            channel: ChannelSpec::medication_reminders(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Compiling,
}

/// Mutable state owned by one [`Scheduler`].
#[derive(Debug)]
pub struct SchedulerState {
    pub cache: DedupCache,
    pub channel_created: bool,
    pub phase: Phase,
    pub permission: Permission,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            cache: DedupCache::new(),
            channel_created: false,
            phase: Phase::Idle,
            permission: Permission::Default,
        }
    }
}

/// Counters for one compile-and-arm pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Intakes returned by the store.
    pub intakes: usize,
    /// Intakes for which at least one window was armed.
    pub intakes_armed: usize,
    pub armed: usize,
    /// Windows skipped because the cache already had them.
    pub duplicates: usize,
    /// Compile or arm failures other than permission refusals.
    pub failures: usize,
    /// Arm attempts refused for lack of permission.
    pub denied: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NotSignedIn,
    /// Unsupported platform, missing permission or reminders switched off.
    Disabled,
    /// The trigger did not call for a pass.
    NoTrigger,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    Completed(PassReport),
    Skipped(SkipReason),
    /// The intake query failed; nothing was armed or cached.
    Aborted(String),
}

pub struct Scheduler {
    config: EngineConfig,
    system: NotificationSystem,
    intakes: Arc<dyn IntakeStore>,
    store: Arc<dyn KeyValueStore>,
    preferences: PreferenceRepository,
    reporter: Arc<dyn Reporter>,
    user_id: Option<String>,
    state: SchedulerState,
}

impl Scheduler {
    pub fn new(
        config: EngineConfig,
        system: NotificationSystem,
        intakes: Arc<dyn IntakeStore>,
        store: Arc<dyn KeyValueStore>,
        reporter: Arc<dyn Reporter>,
    ) -> Self {
        let preferences = PreferenceRepository::open(store.clone());
        Self {
            config,
            system,
            intakes,
            store,
            preferences,
            reporter,
            user_id: None,
            state: SchedulerState::default(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn set_user(&mut self, user_id: Option<String>) {
        self.user_id = user_id;
    }

    pub fn state(&self) -> &SchedulerState {
        &self.state
    }

    pub fn system(&self) -> &NotificationSystem {
        &self.system
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn preferences(&self) -> Preferences {
        self.preferences.current()
    }

    /// Number of windows currently remembered as armed.
    pub fn scheduled_count(&self) -> usize {
        self.state.cache.len()
    }

    /// Whether automatic passes may run right now.
    pub fn can_schedule(&self) -> bool {
        self.system.is_supported
            && (self.system.mode == AdapterMode::Web || self.state.permission.is_granted())
            && self.preferences.current().reminders_on()
    }

    /// Reload preferences and the cache, set up the channel and read the
    /// permission state.
    pub async fn prepare(&mut self) {
        self.preferences.load();
        self.state.cache = DedupCache::restore(self.store.as_ref());
        self.ensure_channel().await;
        self.refresh_permission().await;
    }

    /// Process start: [`prepare`](Self::prepare), then run a silent pass if
    /// scheduling is allowed.
    pub async fn mount(&mut self, now: DateTime<Utc>) -> PassOutcome {
        self.prepare().await;

        if !self.can_schedule() {
            debug!(
                supported = self.system.is_supported,
                permission = ?self.state.permission,
                prefs = ?self.preferences.current(),
                "automatic scheduling disabled"
            );
            return PassOutcome::Skipped(SkipReason::Disabled);
        }
        info!(mode = %self.system.mode, "automatic scheduling enabled");
        self.run_pass(now, false).await
    }

    /// Save a preference change. Only a change to a gating flag that leaves
    /// scheduling enabled triggers a pass; offset changes wait for a manual
    /// reschedule.
    pub async fn preferences_changed(
        &mut self,
        patch: &PreferencePatch,
        now: DateTime<Utc>,
    ) -> PassOutcome {
        let gating = patch.touches_gating(&self.preferences.current());
        self.preferences.save(patch);
        if !gating {
            return PassOutcome::Skipped(SkipReason::NoTrigger);
        }
        if !self.can_schedule() {
            return PassOutcome::Skipped(SkipReason::Disabled);
        }
        self.run_pass(now, false).await
    }

    /// Ask the adapter for permission and report the answer; a fresh grant
    /// triggers a pass.
    pub async fn request_permission(&mut self, now: DateTime<Utc>) -> crate::Result<Permission> {
        let before = self.state.permission;
        let granted = match self.system.adapter.request_permission().await {
            Ok(granted) => granted,
            Err(e) => {
                warn!(error = %e, "permission request failed");
                let message = if matches!(e, Error::AdapterUnavailable(_)) {
                    "Notifications are not supported on this device"
                } else {
                    "Could not request notification permission"
                };
                self.toast(ToastLevel::Error, message);
                return Err(e);
            }
        };
        self.state.permission = granted;
        if granted.is_granted() {
            self.toast(ToastLevel::Success, "Notifications enabled ✓");
        } else {
            self.toast(ToastLevel::Error, "Notification permission refused");
        }
        if !before.is_granted() && granted.is_granted() && self.can_schedule() {
            self.run_pass(now, false).await;
        }
        Ok(granted)
    }

    /// Show one immediate notification so the user can check delivery.
    /// Returns whether it was shown.
    pub async fn send_test_notification(&self) -> bool {
        match self
            .system
            .adapter
            .show_now(TEST_NOTIFICATION_TITLE, TEST_NOTIFICATION_BODY)
            .await
        {
            Ok(()) => {
                self.toast(ToastLevel::Success, "Test notification sent ✓");
                true
            }
            Err(Error::PermissionDenied) => {
                self.toast(ToastLevel::Error, "Notification permission required");
                false
            }
            Err(e) => {
                warn!(error = %e, "test notification failed");
                self.toast(ToastLevel::Error, "Error while sending the test notification");
                false
            }
        }
    }

    /// Manual "reschedule everything": cancel armed alerts, forget the cache,
    /// then rebuild.
    pub async fn reschedule_all(
        &mut self,
        now: DateTime<Utc>,
        show_diagnostics: bool,
    ) -> PassOutcome {
        info!("full reschedule requested");
        if show_diagnostics {
            self.toast(ToastLevel::Loading, "Rescheduling notifications...");
        }

        self.state.cache.clear();
        if let Err(e) = DedupCache::forget(self.store.as_ref()) {
            warn!(error = %e, "failed to remove durable reminder cache");
        }

        match self.system.adapter.list_armed().await {
            Ok(armed) if !armed.is_empty() => {
                let ids: Vec<i32> = armed.iter().map(|a| a.id).collect();
                match self.system.adapter.cancel(&ids).await {
                    Ok(()) => debug!(cancelled = ids.len(), "armed alerts cancelled"),
                    Err(e) => warn!(error = %e, "failed to cancel armed alerts"),
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to list armed alerts"),
        }

        self.refresh_permission().await;
        let outcome = if self.system.is_supported && self.preferences.current().reminders_on() {
            self.run_pass(now, show_diagnostics).await
        } else {
            PassOutcome::Skipped(SkipReason::Disabled)
        };

        if show_diagnostics {
            self.summarize(&outcome).await;
        }
        outcome
    }

    async fn summarize(&self, outcome: &PassOutcome) {
        match outcome {
            PassOutcome::Completed(report) if report.denied > 0 && report.armed == 0 => {
                self.toast(ToastLevel::Error, "Notification permission denied");
            }
            PassOutcome::Completed(_) => match self.system.adapter.list_armed().await {
                Ok(armed) => self.toast(
                    ToastLevel::Success,
                    format!("{} notifications scheduled", armed.len()),
                ),
                Err(e) => {
                    warn!(error = %e, "failed to verify armed alerts");
                    self.toast(ToastLevel::Error, "Error while scheduling notifications");
                }
            },
            PassOutcome::Skipped(SkipReason::NotSignedIn) => {
                self.toast(ToastLevel::Info, "Sign in to schedule reminders");
            }
            PassOutcome::Skipped(_) => {
                self.toast(ToastLevel::Info, "Medication reminders are disabled");
            }
            // The pass already reported the query failure.
            PassOutcome::Aborted(_) => {}
        }
    }

    async fn ensure_channel(&mut self) {
        if self.state.channel_created || self.system.mode != AdapterMode::Native {
            return;
        }
        match self.system.adapter.ensure_channel(&self.config.channel).await {
            Ok(()) => self.state.channel_created = true,
            Err(e) => warn!(error = %e, "failed to create notification channel"),
        }
    }

    async fn refresh_permission(&mut self) {
        self.state.permission = match self.system.adapter.check_permission().await {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "permission check failed");
                Permission::Default
            }
        };
    }

    async fn run_pass(&mut self, now: DateTime<Utc>, show_diagnostics: bool) -> PassOutcome {
        let Some(user_id) = self.user_id.clone() else {
            debug!("no signed-in user, pass skipped");
            return PassOutcome::Skipped(SkipReason::NotSignedIn);
        };
        self.state.phase = Phase::Compiling;
        let outcome = self.compile_and_arm(&user_id, now, show_diagnostics).await;
        self.state.phase = Phase::Idle;
        outcome
    }

    async fn compile_and_arm(
        &mut self,
        user_id: &str,
        now: DateTime<Utc>,
        show_diagnostics: bool,
    ) -> PassOutcome {
        let Some(until) = now.checked_add_signed(self.config.lookahead) else {
            error!(lookahead = %self.config.lookahead, "lookahead overflows the calendar");
            if show_diagnostics {
                self.toast(ToastLevel::Error, "Invalid lookahead window");
            }
            return PassOutcome::Aborted("lookahead overflows the calendar".to_string());
        };
        let intakes = match self.intakes.pending_between(user_id, now, until).await {
            Ok(intakes) => intakes,
            Err(e) => {
                error!(error = %e, "failed to load upcoming intakes");
                if show_diagnostics {
                    self.toast(ToastLevel::Error, format!("Could not load upcoming doses: {e}"));
                }
                return PassOutcome::Aborted(e.to_string());
            }
        };

        let mut report = PassReport {
            intakes: intakes.len(),
            ..PassReport::default()
        };
        if intakes.is_empty() {
            debug!("no pending intakes in the lookahead window");
            if show_diagnostics {
                self.toast(ToastLevel::Info, "No doses to schedule in the next 24 hours");
            }
        }

        let prefs = self.preferences.current();
        for intake in &intakes {
            let windows = match compile_intake(intake, &prefs, now, &self.config.clock) {
                Ok(windows) => windows,
                Err(e) => {
                    warn!(intake = %intake.id, error = %e, "skipping intake");
                    report.failures += 1;
                    continue;
                }
            };

            let mut armed_here = 0;
            for window in windows {
                let key = window.dedupe_key();
                if self.state.cache.has(&key) {
                    report.duplicates += 1;
                    continue;
                }
                let alert = ArmedAlert {
                    id: window.alert_id(),
                    title: window.title,
                    body: window.body,
                    fire_at: window.fire_at,
                    channel: Some(self.config.channel.id.clone()),
                };
                match self.system.adapter.arm(alert).await {
                    Ok(()) => {
                        self.state.cache.add(key);
                        armed_here += 1;
                    }
                    Err(Error::PermissionDenied) => {
                        debug!(
                            intake = %intake.id,
                            kind = ?window.kind,
                            "arm refused: permission denied"
                        );
                        report.denied += 1;
                    }
                    Err(e) => {
                        warn!(
                            intake = %intake.id,
                            kind = ?window.kind,
                            error = %e,
                            "failed to arm reminder"
                        );
                        report.failures += 1;
                    }
                }
            }
            if armed_here > 0 {
                report.intakes_armed += 1;
                report.armed += armed_here;
            }
        }

        self.state.cache.sweep_older_than(now, self.config.retention);
        if let Err(e) = self.state.cache.persist(self.store.as_ref()) {
            warn!(error = %e, "reminder cache not persisted");
        }

        info!(
            intakes = report.intakes,
            intakes_armed = report.intakes_armed,
            armed = report.armed,
            duplicates = report.duplicates,
            failures = report.failures,
            denied = report.denied,
            "scheduling pass complete"
        );
        PassOutcome::Completed(report)
    }

    fn toast(&self, level: ToastLevel, message: impl Into<String>) {
        self.reporter.report(Toast::new(level, message));
    }
}
