//! dosewatch-core: the medication reminder scheduling engine.
//!
//! Pending intakes plus reminder preferences are compiled into up to three
//! alert windows per dose, filtered through a persisted dedup cache, and armed
//! on whichever notification backend the host offers.

pub mod adapter;
pub mod dedup;
pub mod diagnostics;
pub mod error;
pub mod intake;
pub mod orchestrator;
pub mod preferences;
pub mod reminders;
pub mod store;
pub mod time;

pub use adapter::{
    AdapterMode, ArmedAlert, ChannelSpec, NotificationAdapter, NotificationSystem, Permission,
};
pub use dedup::DedupCache;
pub use diagnostics::{NullReporter, Reporter, Toast, ToastLevel, TracingReporter};
pub use error::{Error, Result};
pub use intake::{Intake, IntakeStatus, IntakeStore, MemoryIntakeStore};
pub use orchestrator::{
    EngineConfig, PassOutcome, PassReport, Phase, Scheduler, SchedulerState, SkipReason,
};
pub use preferences::{PreferencePatch, PreferenceRepository, Preferences};
pub use reminders::{ReminderKind, ReminderWindow, compile, compile_intake};
pub use store::{FileStore, KeyValueStore, MemoryStore};
pub use time::{CivilClock, FireClock};
