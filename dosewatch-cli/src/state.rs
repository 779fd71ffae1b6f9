use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// Root of all dosewatch state: `$DOSEWATCH_HOME`, else `~/.dosewatch`.
pub fn dosewatch_home() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os("DOSEWATCH_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    let home = std::env::var("HOME").context("HOME is not set")?;
    Ok(PathBuf::from(home).join(".dosewatch"))
}

pub fn ensure_dosewatch_home() -> Result<PathBuf> {
    let dir = dosewatch_home()?;
    fs::create_dir_all(&dir).with_context(|| format!("create {}", dir.display()))?;
    Ok(dir)
}

/// Directory backing the durable key-value store.
pub fn storage_dir() -> Result<PathBuf> {
    Ok(ensure_dosewatch_home()?.join("storage"))
}

pub fn default_intakes_path() -> Result<PathBuf> {
    Ok(ensure_dosewatch_home()?.join("intakes.json"))
}

/// Expand a leading `~/` against `$HOME`.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), std::env::var_os("HOME")) {
        (Some(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => PathBuf::from(path),
    }
}
