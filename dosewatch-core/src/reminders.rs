//! Reminder compiler: intakes + preferences -> concrete alert windows.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::dedup;
use crate::error::{Error, Result};
use crate::intake::Intake;
use crate::preferences::Preferences;
use crate::time::CivilClock;

pub const DEFAULT_LOOKAHEAD_HOURS: i64 = 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderKind {
    Before,
    OnTime,
    After,
}

impl ReminderKind {
    /// Suffix mixed into the adapter id. Stable across releases.
    pub fn id_suffix(self) -> &'static str {
        match self {
            ReminderKind::Before => "before",
            ReminderKind::OnTime => "ontime",
            ReminderKind::After => "after",
        }
    }
}

/// One alert to arm. Recomputed on every pass, never stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderWindow {
    pub intake_id: String,
    pub kind: ReminderKind,
    pub fire_at: DateTime<Utc>,
    pub title: String,
    pub body: String,
}

impl ReminderWindow {
    pub fn dedupe_key(&self) -> String {
        dedup::key_for(&self.intake_id, self.fire_at)
    }

    pub fn alert_id(&self) -> i32 {
        alert_id(&self.intake_id, self.kind)
    }
}

/// 31-multiplier string hash over UTF-16 code units, wrapping at 32 bits.
pub fn stable_hash(s: &str) -> i32 {
    s.encode_utf16().fold(0i32, |h, unit| {
        h.wrapping_mul(31).wrapping_add(i32::from(unit))
    })
}

/// Adapter-level id for one logical alert. Always non-negative.
pub fn alert_id(intake_id: &str, kind: ReminderKind) -> i32 {
    let h = stable_hash(&format!("{intake_id}_{}", kind.id_suffix()));
    h.checked_abs().unwrap_or(i32::MAX)
}

/// Compute the future windows for a single intake.
///
/// Non-pending intakes produce nothing. Windows at or before `now` are dropped.
pub fn compile_intake(
    intake: &Intake,
    prefs: &Preferences,
    now: DateTime<Utc>,
    clock: &CivilClock,
) -> Result<Vec<ReminderWindow>> {
    if !intake.is_pending() {
        return Ok(vec![]);
    }

    let due = clock.device_instant(intake.scheduled_at);
    let name = intake.display_name();
    let dosage = intake.display_dosage();
    let overflow = |what: &str| Error::Compile {
        intake_id: intake.id.clone(),
        reason: format!("{what} window overflows the calendar"),
    };

    let mut out = Vec::with_capacity(3);

    let before = prefs.before_minutes();
    if before > 0 {
        let at = due
            .checked_sub_signed(Duration::minutes(before.into()))
            .ok_or_else(|| overflow("before"))?;
        out.push(ReminderWindow {
            intake_id: intake.id.clone(),
            kind: ReminderKind::Before,
            fire_at: at,
            title: "💊 Upcoming dose".to_string(),
            body: format!("{name} - {dosage}\nTake in {before} min"),
        });
    }

    out.push(ReminderWindow {
        intake_id: intake.id.clone(),
        kind: ReminderKind::OnTime,
        fire_at: due,
        title: "💊 Time for your medication".to_string(),
        body: format!("{name} - {dosage}"),
    });

    let after = prefs.after_minutes();
    if after > 0 {
        let at = due
            .checked_add_signed(Duration::minutes(after.into()))
            .ok_or_else(|| overflow("after"))?;
        out.push(ReminderWindow {
            intake_id: intake.id.clone(),
            kind: ReminderKind::After,
            fire_at: at,
            title: "⏰ Did you take your medication?".to_string(),
            body: format!("{name} - {dosage}\nScheduled at {}", clock.device_hhmm(due)),
        });
    }

    out.retain(|w| {
        let keep = w.fire_at > now;
        if !keep {
            debug!(
                intake = %w.intake_id,
                kind = ?w.kind,
                fire_at = %w.fire_at,
                "window already past, dropped"
            );
        }
        keep
    });
    Ok(out)
}

/// Compile every candidate intake scheduled no later than `now + lookahead`.
///
/// A failing intake is logged and skipped.
pub fn compile(
    intakes: &[Intake],
    prefs: &Preferences,
    now: DateTime<Utc>,
    clock: &CivilClock,
    lookahead: Duration,
) -> Vec<ReminderWindow> {
    let horizon = now.checked_add_signed(lookahead).unwrap_or(DateTime::<Utc>::MAX_UTC);
    let mut out = Vec::new();
    for intake in intakes.iter().filter(|i| i.scheduled_at <= horizon) {
        match compile_intake(intake, prefs, now, clock) {
            Ok(windows) => out.extend(windows),
            Err(e) => warn!(intake = %intake.id, error = %e, "skipping intake"),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::IntakeStatus;
    use crate::time::{parse_local_to_utc, FireClock};

    fn paris() -> CivilClock {
        CivilClock::from_names("Europe/Paris", "Europe/Paris").unwrap()
    }

    fn paris_at(hhmm: &str) -> DateTime<Utc> {
        parse_local_to_utc(&format!("2025-01-15 {hhmm}"), "Europe/Paris").unwrap()
    }

    fn dose() -> Intake {
        Intake::new("intake-1", "Doliprane", paris_at("09:30")).with_dosage("1000 mg")
    }

    fn prefs(before: u32, after: u32) -> Preferences {
        Preferences {
            before_offset_minutes: before,
            after_offset_minutes: after,
            ..Preferences::default()
        }
    }

    fn kinds(ws: &[ReminderWindow]) -> Vec<ReminderKind> {
        ws.iter().map(|w| w.kind).collect()
    }

    #[test]
    fn three_windows_when_all_future() {
        let ws = compile_intake(&dose(), &prefs(5, 10), paris_at("09:00"), &paris()).unwrap();
        let times: Vec<DateTime<Utc>> = ws.iter().map(|w| w.fire_at).collect();
        assert_eq!(times, vec![paris_at("09:25"), paris_at("09:30"), paris_at("09:40")]);
        assert_eq!(
            kinds(&ws),
            vec![ReminderKind::Before, ReminderKind::OnTime, ReminderKind::After]
        );
    }

    #[test]
    fn past_windows_are_dropped() {
        let ws = compile_intake(&dose(), &prefs(5, 10), paris_at("09:35"), &paris()).unwrap();
        assert_eq!(kinds(&ws), vec![ReminderKind::After]);
        assert_eq!(ws[0].fire_at, paris_at("09:40"));
    }

    #[test]
    fn window_exactly_at_now_is_dropped() {
        let ws = compile_intake(&dose(), &prefs(5, 10), paris_at("09:30"), &paris()).unwrap();
        assert_eq!(kinds(&ws), vec![ReminderKind::After]);
    }

    #[test]
    fn disabled_offsets_leave_on_time_only() {
        let ws = compile_intake(&dose(), &prefs(0, 0), paris_at("08:00"), &paris()).unwrap();
        assert_eq!(kinds(&ws), vec![ReminderKind::OnTime]);

        let ws = compile_intake(&dose(), &prefs(0, 10), paris_at("08:00"), &paris()).unwrap();
        assert_eq!(kinds(&ws), vec![ReminderKind::OnTime, ReminderKind::After]);
    }

    #[test]
    fn fully_past_intake_yields_nothing() {
        let ws = compile_intake(&dose(), &prefs(5, 10), paris_at("10:00"), &paris()).unwrap();
        assert!(ws.is_empty());
    }

    #[test]
    fn non_pending_intake_yields_nothing() {
        let taken = dose().with_status(IntakeStatus::Taken);
        let ws = compile_intake(&taken, &prefs(5, 10), paris_at("09:00"), &paris()).unwrap();
        assert!(ws.is_empty());
    }

    #[test]
    fn templates_carry_name_dosage_and_offsets() {
        let ws = compile_intake(&dose(), &prefs(5, 10), paris_at("09:00"), &paris()).unwrap();
        assert_eq!(ws[0].body, "Doliprane - 1000 mg\nTake in 5 min");
        assert_eq!(ws[1].title, "💊 Time for your medication");
        assert_eq!(ws[1].body, "Doliprane - 1000 mg");
        assert_eq!(ws[2].body, "Doliprane - 1000 mg\nScheduled at 09:30");
    }

    #[test]
    fn device_zone_shifts_every_window() {
        let clock = CivilClock::from_names("Europe/Paris", "America/New_York").unwrap();
        let now = DateTime::parse_from_rfc3339("2025-01-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let ws = compile_intake(&dose(), &prefs(5, 10), now, &clock).unwrap();
        let on_time = ws.iter().find(|w| w.kind == ReminderKind::OnTime).unwrap();
        assert_eq!(on_time.fire_at.to_rfc3339(), "2025-01-15T14:30:00+00:00");
        assert_eq!(ws.len(), 3);
    }

    #[test]
    fn absolute_clock_ignores_device_zone() {
        let clock = CivilClock::from_names("Europe/Paris", "America/New_York")
            .unwrap()
            .with_fire_clock(FireClock::AbsoluteInstant);
        let ws = compile_intake(&dose(), &prefs(0, 0), paris_at("08:00"), &clock).unwrap();
        assert_eq!(ws[0].fire_at.to_rfc3339(), "2025-01-15T08:30:00+00:00");
    }

    #[test]
    fn compile_respects_lookahead_end() {
        let far = Intake::new("far", "X", paris_at("09:30") + Duration::hours(30));
        let ws = compile(
            &[dose(), far],
            &prefs(0, 0),
            paris_at("09:00"),
            &paris(),
            Duration::hours(DEFAULT_LOOKAHEAD_HOURS),
        );
        assert_eq!(ws.len(), 1);
        assert_eq!(ws[0].intake_id, "intake-1");
    }

    #[test]
    fn unbounded_lookahead_keeps_every_intake() {
        let far = Intake::new("far", "X", paris_at("09:30") + Duration::days(400));
        let ws = compile(
            &[dose(), far],
            &prefs(0, 0),
            paris_at("09:00"),
            &paris(),
            Duration::days(100_000_000),
        );
        assert_eq!(ws.len(), 2);
    }

    #[test]
    fn stable_hash_matches_known_values() {
        assert_eq!(stable_hash(""), 0);
        assert_eq!(stable_hash("a"), 97);
        assert_eq!(stable_hash("hello"), 99_162_322);
        assert_eq!(stable_hash("polygenelubricants"), i32::MIN);
    }

    #[test]
    fn alert_ids_are_stable_and_non_negative() {
        let w = compile_intake(&dose(), &prefs(5, 10), paris_at("09:00"), &paris()).unwrap();
        let ids: Vec<i32> = w.iter().map(ReminderWindow::alert_id).collect();
        assert!(ids.iter().all(|id| *id >= 0));
        assert_eq!(ids[0], alert_id("intake-1", ReminderKind::Before));
        assert_ne!(ids[0], ids[1]);
        assert_ne!(ids[1], ids[2]);
        assert_eq!(alert_id("intake-1", ReminderKind::OnTime), ids[1]);
    }

    #[test]
    fn dedupe_key_embeds_fire_instant() {
        let ws = compile_intake(&dose(), &prefs(0, 0), paris_at("09:00"), &paris()).unwrap();
        assert_eq!(
            ws[0].dedupe_key(),
            format!("intake-1_{}", paris_at("09:30").timestamp_millis())
        );
    }
}
