//! User-visible outcome reporting ("toasts"). Best-effort only.

use std::sync::Mutex;
use tracing::{error, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Loading,
    Info,
    Success,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toast {
    pub level: ToastLevel,
    pub message: String,
}

impl Toast {
    pub fn new(level: ToastLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }
}

/// Receives toasts. Must not fail or block.
pub trait Reporter: Send + Sync {
    fn report(&self, toast: Toast);
}

/// Writes toasts to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, toast: Toast) {
        match toast.level {
            ToastLevel::Error => error!(target: "dosewatch::toast", "{}", toast.message),
            _ => info!(target: "dosewatch::toast", level = ?toast.level, "{}", toast.message),
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn report(&self, _toast: Toast) {}
}

/// Keeps every toast; handy for embedding and tests.
#[derive(Debug, Default)]
pub struct RecordingReporter {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Reporter for RecordingReporter {
    fn report(&self, toast: Toast) {
        self.toasts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(toast);
    }
}
