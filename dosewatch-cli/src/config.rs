use anyhow::{Context, Result, ensure};
use chrono::Duration;
use dosewatch_core::time::{DEFAULT_REFERENCE_TIMEZONE, parse_tz};
use dosewatch_core::{CivilClock, EngineConfig, FireClock};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::state::{default_intakes_path, ensure_dosewatch_home, expand_home};

/// One month.
const MAX_LOOKAHEAD_HOURS: i64 = 24 * 31;
/// One leap year.
const MAX_RETENTION_HOURS: i64 = 24 * 366;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schedule: ScheduleSection,
    pub session: SessionSection,
    pub intakes: IntakesSection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleSection {
    /// Zone the intake timestamps were entered in.
    pub reference_timezone: String,
    /// Zone of this device. Falls back to `$TZ`, then to the reference zone.
    pub device_timezone: Option<String>,
    pub fire_clock: FireClock,
    pub lookahead_hours: i64,
    pub cache_retention_hours: i64,
}

impl Default for ScheduleSection {
    fn default() -> Self {
        Self {
            reference_timezone: DEFAULT_REFERENCE_TIMEZONE.to_string(),
            device_timezone: None,
            fire_clock: FireClock::default(),
            lookahead_hours: 24,
            cache_retention_hours: 48,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Signed-in user. Without one, passes are skipped.
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntakesSection {
    /// JSON array of intakes (default: ~/.dosewatch/intakes.json)
    pub path: Option<String>,
}

impl Config {
    /// Device zone name after applying the `$TZ` and reference fallbacks.
    pub fn device_timezone(&self, tz_env: Option<&str>) -> String {
        self.schedule
            .device_timezone
            .clone()
            .or_else(|| {
                tz_env
                    .map(|t| t.trim_start_matches(':').to_string())
                    .filter(|t| parse_tz(t).is_ok())
            })
            .unwrap_or_else(|| self.schedule.reference_timezone.clone())
    }

    pub fn engine_config(&self) -> Result<EngineConfig> {
        let tz_env = std::env::var("TZ").ok();
        let device = self.device_timezone(tz_env.as_deref());
        let clock = CivilClock::from_names(&self.schedule.reference_timezone, &device)
            .context("invalid timezone in [schedule]")?
            .with_fire_clock(self.schedule.fire_clock);

        ensure!(
            self.schedule.lookahead_hours <= MAX_LOOKAHEAD_HOURS,
            "[schedule] lookahead_hours must be at most {MAX_LOOKAHEAD_HOURS}"
        );
        ensure!(
            self.schedule.cache_retention_hours <= MAX_RETENTION_HOURS,
            "[schedule] cache_retention_hours must be at most {MAX_RETENTION_HOURS}"
        );

        let mut engine = EngineConfig::new(clock);
        if self.schedule.lookahead_hours > 0 {
            engine.lookahead = Duration::hours(self.schedule.lookahead_hours);
        }
        if self.schedule.cache_retention_hours > 0 {
            engine.retention = Duration::hours(self.schedule.cache_retention_hours);
        }
        Ok(engine)
    }

    pub fn intakes_path(&self) -> Result<PathBuf> {
        match &self.intakes.path {
            Some(p) => Ok(expand_home(p)),
            None => default_intakes_path(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    Ok(ensure_dosewatch_home()?.join("config.toml"))
}

pub fn load_config() -> Result<Config> {
    load_config_from(&config_path()?)
}

pub fn load_config_from(p: &Path) -> Result<Config> {
    if !p.exists() {
        return Ok(Config::default());
    }
    let s = fs::read_to_string(p).with_context(|| format!("read {}", p.display()))?;
    toml::from_str(&s).with_context(|| format!("parse {}", p.display()))
}

pub fn save_config(cfg: &Config) -> Result<()> {
    let p = config_path()?;
    let s = toml::to_string_pretty(cfg).context("serialize config")?;
    fs::write(&p, s).with_context(|| format!("write {}", p.display()))?;
    Ok(())
}

pub fn init_config() -> Result<()> {
    let p = config_path()?;
    if p.exists() {
        println!("Config already exists: {}", p.display());
        return Ok(());
    }
    save_config(&Config::default())?;
    println!("Wrote {}", p.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(cfg, Config::default());
        assert_eq!(cfg.schedule.reference_timezone, "Europe/Paris");
        assert_eq!(cfg.session.user_id, None);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("config.toml");
        fs::write(
            &p,
            r#"
[schedule]
device_timezone = "America/New_York"
fire_clock = "absolute_instant"

[session]
user_id = "patient-1"
"#,
        )
        .unwrap();

        let cfg = load_config_from(&p).unwrap();
        assert_eq!(cfg.schedule.fire_clock, FireClock::AbsoluteInstant);
        assert_eq!(cfg.schedule.lookahead_hours, 24);
        assert_eq!(cfg.session.user_id.as_deref(), Some("patient-1"));

        let engine = cfg.engine_config().unwrap();
        assert_eq!(engine.clock.device(), chrono_tz::America::New_York);
        assert_eq!(engine.clock.fire_clock(), FireClock::AbsoluteInstant);
        assert_eq!(engine.lookahead, Duration::hours(24));
    }

    #[test]
    fn device_zone_falls_back_to_tz_then_reference() {
        let cfg = Config::default();
        assert_eq!(cfg.device_timezone(Some(":Asia/Tokyo")), "Asia/Tokyo");
        assert_eq!(cfg.device_timezone(Some("not/a-zone")), "Europe/Paris");
        assert_eq!(cfg.device_timezone(None), "Europe/Paris");
    }

    #[test]
    fn bad_zone_is_an_error() {
        let mut cfg = Config::default();
        cfg.schedule.reference_timezone = "Mars/Olympus".to_string();
        cfg.schedule.device_timezone = Some("Europe/Paris".to_string());
        assert!(cfg.engine_config().is_err());
    }

    #[test]
    fn oversized_windows_are_rejected() {
        let mut cfg = Config::default();
        cfg.schedule.lookahead_hours = 10_000_000_000;
        assert!(cfg.engine_config().is_err());

        let mut cfg = Config::default();
        cfg.schedule.cache_retention_hours = i64::MAX;
        assert!(cfg.engine_config().is_err());

        let mut cfg = Config::default();
        cfg.schedule.lookahead_hours = MAX_LOOKAHEAD_HOURS;
        cfg.schedule.cache_retention_hours = MAX_RETENTION_HOURS;
        let engine = cfg.engine_config().unwrap();
        assert_eq!(engine.lookahead, Duration::hours(MAX_LOOKAHEAD_HOURS));
    }

    #[test]
    fn round_trips_through_toml() {
        let mut cfg = Config::default();
        cfg.session.user_id = Some("u1".to_string());
        let s = toml::to_string_pretty(&cfg).unwrap();
        assert_eq!(toml::from_str::<Config>(&s).unwrap(), cfg);
    }
}
