//! Wall-clock duration arithmetic.
//!
//! Attendance and supervision share the same base computation but round
//! differently: attendance keeps the exact fraction, supervision snaps to the
//! nearest half hour.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

const MINUTES_PER_DAY: i32 = 24 * 60;

/// A time of day with minute precision, written `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    pub fn from_hm(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidClock {
                value: format!("{hour:02}:{minute:02}"),
            });
        }
        Ok(Self {
            minutes: u16::from(hour) * 60 + u16::from(minute),
        })
    }

    /// Minutes since midnight.
    pub const fn minutes(self) -> u16 {
        self.minutes
    }
}

impl FromStr for ClockTime {
    type Err = ValidationError;

    /// Accepts `H:MM`, `HH:MM` and `HH:MM:SS` (seconds are dropped).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidClock {
            value: s.to_string(),
        };
        let mut parts = s.trim().split(':');
        let hour = parts.next().ok_or_else(invalid)?;
        let minute = parts.next().ok_or_else(invalid)?;
        if let Some(second) = parts.next() {
            if second.len() != 2 || second.parse::<u8>().map_or(true, |sec| sec > 59) {
                return Err(invalid());
            }
        }
        if parts.next().is_some() || hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u8 = hour.parse().map_err(|_| invalid())?;
        let minute: u8 = minute.parse().map_err(|_| invalid())?;
        Self::from_hm(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for ClockTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(time: ClockTime) -> Self {
        time.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

/// Minutes from `start` to `end`, wrapping past midnight when `end` is earlier.
pub fn span_minutes(start: ClockTime, end: ClockTime) -> i32 {
    let raw = i32::from(end.minutes) - i32::from(start.minutes);
    let wrapped = if raw < 0 { raw + MINUTES_PER_DAY } else { raw };
    wrapped.max(0)
}

/// Billable hours for an attendance. Unrounded; this value is persisted and billed.
pub fn attendance_hours(start: ClockTime, end: ClockTime) -> Result<f64, ValidationError> {
    let minutes = span_minutes(start, end);
    if minutes == 0 {
        return Err(ValidationError::NonPositiveDuration);
    }
    Ok(f64::from(minutes) / 60.0)
}

/// Hours for a supervision, rounded to the nearest half hour.
pub fn supervision_hours(start: ClockTime, end: ClockTime) -> Result<f64, ValidationError> {
    let hours = attendance_hours(start, end)?;
    Ok(round_half_hour(hours))
}

/// `round(hours * 2) / 2`, halves rounding away from zero.
pub fn round_half_hour(hours: f64) -> f64 {
    (hours * 2.0).round() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(s: &str) -> ClockTime {
        s.parse().expect("valid clock time")
    }

    #[test]
    fn parses_and_formats_clock_times() {
        assert_eq!(t("9:05").to_string(), "09:05");
        assert_eq!(t("23:59").minutes(), 23 * 60 + 59);
        assert_eq!(t("14:30:00").to_string(), "14:30");
    }

    #[test]
    fn rejects_malformed_clock_times() {
        for raw in ["", "24:00", "12:60", "12", "12:5", "ab:cd", "12:00:99", "1:2:3:4"] {
            assert!(
                raw.parse::<ClockTime>().is_err(),
                "{raw:?} should not parse"
            );
        }
    }

    #[test]
    fn attendance_hours_are_exact_fractions() {
        assert!((attendance_hours(t("08:00"), t("09:30")).unwrap() - 1.5).abs() < f64::EPSILON);
        let forty_minutes = attendance_hours(t("10:00"), t("10:40")).unwrap();
        assert!((forty_minutes - 40.0 / 60.0).abs() < f64::EPSILON);
    }

    #[test]
    fn overnight_sessions_wrap() {
        let hours = attendance_hours(t("23:00"), t("01:00")).unwrap();
        assert!((hours - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_duration_is_rejected() {
        assert_eq!(
            attendance_hours(t("10:00"), t("10:00")),
            Err(ValidationError::NonPositiveDuration)
        );
        assert_eq!(
            supervision_hours(t("10:00"), t("10:00")),
            Err(ValidationError::NonPositiveDuration)
        );
    }

    #[test]
    fn supervision_hours_snap_to_half_hours() {
        assert!((supervision_hours(t("08:00"), t("08:40")).unwrap() - 0.5).abs() < f64::EPSILON);
        assert!((supervision_hours(t("08:00"), t("08:50")).unwrap() - 1.0).abs() < f64::EPSILON);
        assert!((supervision_hours(t("08:00"), t("08:10")).unwrap()).abs() < f64::EPSILON);
        assert!((supervision_hours(t("08:00"), t("09:15")).unwrap() - 1.5).abs() < f64::EPSILON);
    }
}
