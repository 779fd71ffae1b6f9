//! Civil-time arithmetic: reference wall clock vs. device wall clock.
//!
//! Dosing schedules are authored in a fixed reference timezone. The device
//! fires at the same wall-clock reading in its own timezone.

use chrono::{DateTime, Duration, LocalResult, NaiveDateTime, Offset, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_REFERENCE_TIMEZONE: &str = "Europe/Paris";

/// How a stored instant maps to the instant the device fires at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FireClock {
    /// Read the instant on the reference wall clock, then fire when the
    /// device wall clock shows the same reading.
    #[default]
    ReferenceWallClock,
    /// Fire at the stored instant itself.
    AbsoluteInstant,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CivilClock {
    reference: Tz,
    device: Tz,
    fire_clock: FireClock,
}

impl CivilClock {
    pub fn new(reference: Tz, device: Tz) -> Self {
        Self {
            reference,
            device,
            fire_clock: FireClock::default(),
        }
    }

    pub fn from_names(reference: &str, device: &str) -> Result<Self> {
        Ok(Self::new(parse_tz(reference)?, parse_tz(device)?))
    }

    pub fn with_fire_clock(mut self, fire_clock: FireClock) -> Self {
        self.fire_clock = fire_clock;
        self
    }

    pub fn reference(&self) -> Tz {
        self.reference
    }

    pub fn device(&self) -> Tz {
        self.device
    }

    pub fn fire_clock(&self) -> FireClock {
        self.fire_clock
    }

    /// Wall-clock reading of `utc` in the reference timezone.
    pub fn reference_wall_clock(&self, utc: DateTime<Utc>) -> NaiveDateTime {
        utc.with_timezone(&self.reference).naive_local()
    }

    /// Instant at which the device should fire for a dose stored as `utc`.
    pub fn device_instant(&self, utc: DateTime<Utc>) -> DateTime<Utc> {
        match self.fire_clock {
            FireClock::AbsoluteInstant => utc,
            FireClock::ReferenceWallClock => {
                resolve_local(self.device, self.reference_wall_clock(utc))
            }
        }
    }

    /// `HH:MM` of an instant as shown on the device.
    pub fn device_hhmm(&self, utc: DateTime<Utc>) -> String {
        utc.with_timezone(&self.device).format("%H:%M").to_string()
    }
}

pub fn parse_tz(name: &str) -> Result<Tz> {
    name.parse()
        .map_err(|_| Error::Timezone(name.to_string()))
}

/// Resolve a wall-clock reading in `tz` to an instant.
///
/// Ambiguous readings (DST fall-back) take the earlier instant. Readings that
/// fall in a DST gap are pushed forward by the size of the gap.
pub fn resolve_local(tz: Tz, naive: NaiveDateTime) -> DateTime<Utc> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(t) => t.with_timezone(&Utc),
        LocalResult::Ambiguous(earliest, _) => earliest.with_timezone(&Utc),
        LocalResult::None => {
            // Use the offset in force before the transition.
            let before = tz
                .offset_from_utc_datetime(&(naive - Duration::hours(24)))
                .fix()
                .local_minus_utc();
            Utc.from_utc_datetime(&(naive - Duration::seconds(before.into())))
        }
    }
}

/// Parse a wall-clock reading like "2025-01-15 09:30" in an IANA tz, returning UTC.
pub fn parse_local_to_utc(local: &str, tz: &str) -> Result<DateTime<Utc>> {
    let tz = parse_tz(tz)?;
    let ndt = NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(local, "%Y-%m-%d %H:%M:%S"))
        .map_err(|e| Error::Timezone(format!("invalid local datetime '{local}': {e}")))?;
    Ok(resolve_local(tz, ndt))
}
