//! Host-side display of a due alert.

use std::path::PathBuf;
use std::process::Command;
use std::sync::Mutex;

use crate::error::{Error, Result};

pub trait Notifier: Send + Sync {
    /// Whether this host can display anything at all.
    fn available(&self) -> bool;

    fn show(&self, title: &str, body: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flavor {
    NotifySend,
    Osascript,
}

/// Shells out to `notify-send` (freedesktop) or `osascript` (macOS).
#[derive(Debug, Clone)]
pub struct CommandNotifier {
    program: Option<(Flavor, PathBuf)>,
}

impl CommandNotifier {
    /// Find a notifier binary on `PATH`.
    pub fn detect() -> Self {
        let candidates: &[(Flavor, &str)] = if cfg!(target_os = "macos") {
            &[(Flavor::Osascript, "osascript"), (Flavor::NotifySend, "notify-send")]
        } else {
            &[(Flavor::NotifySend, "notify-send")]
        };
        let program = candidates
            .iter()
            .find_map(|(flavor, bin)| which::which(bin).ok().map(|p| (*flavor, p)));
        Self { program }
    }

    /// A notifier that can never display anything.
    pub fn unavailable() -> Self {
        Self { program: None }
    }
}

impl Notifier for CommandNotifier {
    fn available(&self) -> bool {
        self.program.is_some()
    }

    fn show(&self, title: &str, body: &str) -> Result<()> {
        let (flavor, bin) = self
            .program
            .as_ref()
            .ok_or_else(|| Error::Notifier("no notifier command on PATH".to_string()))?;

        let mut cmd = Command::new(bin);
        match flavor {
            Flavor::NotifySend => {
                cmd.args(["--app-name", "dosewatch", "--urgency", "critical"])
                    .arg(title)
                    .arg(body);
            }
            Flavor::Osascript => {
                let script = format!(
                    r#"display notification "{}" with title "{}" sound name "default""#,
                    escape_applescript(body),
                    escape_applescript(title)
                );
                cmd.arg("-e").arg(script);
            }
        }

        let output = cmd
            .output()
            .map_err(|e| Error::Notifier(format!("running {}: {e}", bin.display())))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Notifier(format!("{}: {}", bin.display(), stderr.trim())));
        }
        Ok(())
    }
}

fn escape_applescript(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

/// Keeps shown alerts in memory. Useful when embedding and in tests.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    shown: Mutex<Vec<(String, String)>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose `show` always fails.
    pub fn failing() -> Self {
        Self {
            shown: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn shown(&self) -> Vec<(String, String)> {
        self.shown.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl Notifier for RecordingNotifier {
    fn available(&self) -> bool {
        true
    }

    fn show(&self, title: &str, body: &str) -> Result<()> {
        if self.fail {
            return Err(Error::Notifier("display refused".to_string()));
        }
        self.shown
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((title.to_string(), body.to_string()));
        Ok(())
    }
}
