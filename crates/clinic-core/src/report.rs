//! Financial aggregation.
//!
//! Two views over the same attendance rows: what guardians owe per patient,
//! and what the clinic owes each staff member. Both are pure functions of the
//! loaded rows and are recomputed on every request.

use std::collections::BTreeMap;

use chrono::{Datelike, Months, NaiveDate};
use serde::Serialize;

use crate::attendance::Attendance;
use crate::patient::{Patient, User};
use crate::supervision::{Supervision, SupervisionRates};
use crate::types::{PatientId, Sector, UserId, ValidationError};

/// Pending hours above this flag a patient as at risk.
pub const RISK_PENDING_HOURS: f64 = 10.0;

/// A confirmation rate (percent) below this flags a patient as at risk.
pub const RISK_CONFIRMATION_RATE: f64 = 50.0;

/// A calendar month, as a half-open date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReportPeriod {
    pub month: u32,
    pub year: i32,
}

impl ReportPeriod {
    pub fn new(month: u32, year: i32) -> Result<Self, ValidationError> {
        let period = Self { month, year };
        period.bounds()?;
        Ok(period)
    }

    /// First day of the month and first day of the next month.
    pub fn bounds(&self) -> Result<(NaiveDate, NaiveDate), ValidationError> {
        let invalid = || ValidationError::InvalidPeriod {
            month: self.month,
            year: self.year,
        };
        let start = NaiveDate::from_ymd_opt(self.year, self.month, 1).ok_or_else(invalid)?;
        let end = start.checked_add_months(Months::new(1)).ok_or_else(invalid)?;
        Ok((start, end))
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        date.year() == self.year && date.month() == self.month
    }
}

/// One patient's line in the guardian-billing report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardianBillingRow {
    pub patient_id: PatientId,
    pub patient_name: String,
    pub sector: Sector,
    pub hourly_rate: f64,
    pub total_sessions: usize,
    pub confirmed_sessions: usize,
    pub confirmed_hours: f64,
    pub pending_hours: f64,
    pub confirmed_value: f64,
    pub pending_value: f64,
    pub total_value: f64,
    /// Percent of sessions confirmed, 0 to 100.
    pub confirmation_rate: f64,
    /// Advisory only; nothing is blocked on it.
    pub at_risk: bool,
}

/// One staff member's line in the staff-payment report.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StaffPaymentRow {
    pub staff_id: UserId,
    pub staff_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sector: Option<Sector>,
    pub hourly_rate: f64,
    pub supervision_rate: f64,
    pub session_count: usize,
    pub session_hours: f64,
    pub supervision_hours: f64,
    pub session_payment: f64,
    pub supervision_payment: f64,
    pub total_payment: f64,
}

#[derive(Debug, Default)]
struct PatientTally {
    total: usize,
    confirmed: usize,
    confirmed_hours: f64,
    pending_hours: f64,
}

/// Builds the guardian-billing report.
///
/// `attendances` should already be restricted to the period. Patients with no
/// sessions are omitted; sessions whose patient is not in `patients` are
/// ignored. Rows are ordered by patient name.
pub fn guardian_billing(
    patients: &[Patient],
    attendances: &[Attendance],
) -> Vec<GuardianBillingRow> {
    let mut tallies: BTreeMap<&PatientId, PatientTally> = BTreeMap::new();
    for attendance in attendances {
        let tally = tallies.entry(&attendance.patient_id).or_default();
        tally.total += 1;
        if attendance.is_confirmed() {
            tally.confirmed += 1;
            tally.confirmed_hours += attendance.hours;
        } else {
            tally.pending_hours += attendance.hours;
        }
    }

    let mut rows: Vec<GuardianBillingRow> = patients
        .iter()
        .filter_map(|patient| {
            let tally = tallies.get(&patient.id)?;
            Some(billing_row(patient, tally))
        })
        .collect();
    rows.sort_by(|a, b| {
        a.patient_name
            .cmp(&b.patient_name)
            .then_with(|| a.patient_id.cmp(&b.patient_id))
    });
    rows
}

#[allow(clippy::cast_precision_loss)]
fn billing_row(patient: &Patient, tally: &PatientTally) -> GuardianBillingRow {
    let confirmed_value = tally.confirmed_hours * patient.hourly_rate;
    let pending_value = tally.pending_hours * patient.hourly_rate;
    let confirmation_rate = if tally.total == 0 {
        0.0
    } else {
        tally.confirmed as f64 / tally.total as f64 * 100.0
    };
    GuardianBillingRow {
        patient_id: patient.id.clone(),
        patient_name: patient.name.clone(),
        sector: patient.sector,
        hourly_rate: patient.hourly_rate,
        total_sessions: tally.total,
        confirmed_sessions: tally.confirmed,
        confirmed_hours: tally.confirmed_hours,
        pending_hours: tally.pending_hours,
        confirmed_value,
        pending_value,
        total_value: confirmed_value + pending_value,
        confirmation_rate,
        at_risk: tally.pending_hours > RISK_PENDING_HOURS
            || confirmation_rate < RISK_CONFIRMATION_RATE,
    }
}

#[derive(Debug, Default)]
struct StaffTally {
    sessions: usize,
    session_hours: f64,
    supervision_hours: f64,
}

/// Builds the staff-payment report.
///
/// Only confirmed attendances count, credited to their (substitution-resolved)
/// `staff_id`. Staff with zero hours are omitted. Rows are ordered by name.
pub fn staff_payment(
    staff: &[User],
    attendances: &[Attendance],
    supervisions: &[Supervision],
    rates: &SupervisionRates,
) -> Vec<StaffPaymentRow> {
    let mut tallies: BTreeMap<&UserId, StaffTally> = BTreeMap::new();
    for attendance in attendances.iter().filter(|a| a.is_confirmed()) {
        let tally = tallies.entry(&attendance.staff_id).or_default();
        tally.sessions += 1;
        tally.session_hours += attendance.hours;
    }
    for supervision in supervisions {
        tallies.entry(&supervision.staff_id).or_default().supervision_hours += supervision.hours;
    }

    let mut rows: Vec<StaffPaymentRow> = staff
        .iter()
        .filter_map(|member| {
            let tally = tallies.get(&member.id)?;
            if tally.session_hours <= 0.0 && tally.supervision_hours <= 0.0 {
                return None;
            }
            let supervision_rate = member
                .sector
                .map_or(crate::supervision::DEFAULT_SUPERVISION_RATE, |sector| {
                    rates.rate_for(sector)
                });
            let session_payment = tally.session_hours * member.hourly_rate;
            let supervision_payment = tally.supervision_hours * supervision_rate;
            Some(StaffPaymentRow {
                staff_id: member.id.clone(),
                staff_name: member.name.clone(),
                sector: member.sector,
                hourly_rate: member.hourly_rate,
                supervision_rate,
                session_count: tally.sessions,
                session_hours: tally.session_hours,
                supervision_hours: tally.supervision_hours,
                session_payment,
                supervision_payment,
                total_payment: session_payment + supervision_payment,
            })
        })
        .collect();
    rows.sort_by(|a, b| {
        a.staff_name
            .cmp(&b.staff_name)
            .then_with(|| a.staff_id.cmp(&b.staff_id))
    });
    rows
}
