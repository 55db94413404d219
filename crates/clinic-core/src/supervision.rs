//! Supervision records and the per-sector supervision rate table.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::hours::{self, ClockTime};
use crate::types::{Sector, SupervisionId, UserId, ValidationError, non_negative};

/// Hourly supervision rate used when a sector has no configured entry.
pub const DEFAULT_SUPERVISION_RATE: f64 = 35.0;

/// A supervision hour block credited to a staff member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Supervision {
    pub id: SupervisionId,
    pub staff_id: UserId,
    /// Who filed the record; equals `staff_id` for self-reports.
    pub coordinator_id: UserId,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    /// Rounded to the nearest half hour.
    pub hours: f64,
    pub sector: Sector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSupervision {
    pub staff_id: UserId,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub observations: Option<String>,
}

impl NewSupervision {
    pub fn into_supervision(
        self,
        coordinator: &UserId,
        sector: Sector,
        now: DateTime<Utc>,
    ) -> Result<Supervision, ValidationError> {
        let hours = hours::supervision_hours(self.start_time, self.end_time)?;
        Ok(Supervision {
            id: SupervisionId::generate(),
            staff_id: self.staff_id,
            coordinator_id: coordinator.clone(),
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            hours,
            sector,
            observations: self
                .observations
                .map(|text| text.trim().to_string())
                .filter(|text| !text.is_empty()),
            created_at: now,
        })
    }
}

/// Sector to hourly supervision rate.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SupervisionRates(BTreeMap<Sector, f64>);

impl SupervisionRates {
    pub fn new(rates: impl IntoIterator<Item = (Sector, f64)>) -> Result<Self, ValidationError> {
        let mut map = BTreeMap::new();
        for (sector, rate) in rates {
            map.insert(sector, non_negative("supervision rate", rate)?);
        }
        Ok(Self(map))
    }

    /// The configured rate, or [`DEFAULT_SUPERVISION_RATE`].
    pub fn rate_for(&self, sector: Sector) -> f64 {
        self.0
            .get(&sector)
            .copied()
            .unwrap_or(DEFAULT_SUPERVISION_RATE)
    }

    pub fn configured(&self) -> impl Iterator<Item = (Sector, f64)> + '_ {
        self.0.iter().map(|(sector, rate)| (*sector, *rate))
    }
}

/// The persisted rate table with its optimistic-concurrency version.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub rates: SupervisionRates,
    /// Zero when the table has never been saved.
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<UserId>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_sectors_use_default_rate() {
        let rates = SupervisionRates::new([(Sector::Aba, 50.0)]).unwrap();
        assert!((rates.rate_for(Sector::Aba) - 50.0).abs() < f64::EPSILON);
        assert!((rates.rate_for(Sector::Grupo) - DEFAULT_SUPERVISION_RATE).abs() < f64::EPSILON);
    }

    #[test]
    fn negative_rates_rejected() {
        assert!(SupervisionRates::new([(Sector::Denver, -5.0)]).is_err());
    }

    #[test]
    fn rates_serialize_as_sector_map() {
        let rates = SupervisionRates::new([(Sector::Denver, 40.0), (Sector::Aba, 45.5)]).unwrap();
        let json = serde_json::to_string(&rates).unwrap();
        assert_eq!(json, r#"{"aba":45.5,"denver":40.0}"#);
        let parsed: SupervisionRates = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, rates);
    }

    #[test]
    fn new_supervision_rounds_hours() {
        let draft = NewSupervision {
            staff_id: UserId::new("staff-1").unwrap(),
            date: NaiveDate::from_ymd_opt(2025, 3, 4).unwrap(),
            start_time: "14:00".parse().unwrap(),
            end_time: "15:20".parse().unwrap(),
            observations: Some("case review".to_string()),
        };
        let now = DateTime::parse_from_rfc3339("2025-03-04T16:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let supervision = draft
            .into_supervision(&UserId::new("coord").unwrap(), Sector::Aba, now)
            .unwrap();
        assert!((supervision.hours - 1.5).abs() < f64::EPSILON);
        assert_eq!(supervision.coordinator_id.as_str(), "coord");
        assert_eq!(supervision.observations.as_deref(), Some("case review"));
    }
}
