//! The attendance lifecycle.
//!
//! An attendance moves `Pending -> Confirmed -> Approved -> Launched`. Each
//! step is attested by a different party and records who did it and when.
//! There is no negative state: rejecting an attendance deletes it.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::hours::{self, ClockTime};
use crate::identity::{Identity, Role};
use crate::types::{AttendanceId, PatientId, UserId, ValidationError};

/// Lifecycle stage, derived from which attestations are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Pending,
    Confirmed,
    Approved,
    Launched,
}

impl Stage {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Approved => "approved",
            Self::Launched => "launched",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A forward move through the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transition {
    Confirm,
    Approve,
    Launch,
}

impl Transition {
    /// The stage a record must be in for this transition to apply.
    pub const fn from_stage(self) -> Stage {
        match self {
            Self::Confirm => Stage::Pending,
            Self::Approve => Stage::Confirmed,
            Self::Launch => Stage::Approved,
        }
    }

    pub const fn to_stage(self) -> Stage {
        match self {
            Self::Confirm => Stage::Confirmed,
            Self::Approve => Stage::Approved,
            Self::Launch => Stage::Launched,
        }
    }

    pub const fn permits(self, role: Role) -> bool {
        match self {
            Self::Confirm => role.can_confirm(),
            Self::Approve | Self::Launch => role.can_approve(),
        }
    }

    pub const fn verb(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Approve => "approve",
            Self::Launch => "launch",
        }
    }
}

impl fmt::Display for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.verb())
    }
}

/// Why a transition could not be applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransitionError {
    #[error("role {role} may not {transition} attendances")]
    Forbidden { role: Role, transition: Transition },

    /// The record has not reached the stage this transition starts from.
    #[error("cannot {transition} an attendance that is {current}; it must be {required}")]
    OutOfOrder {
        transition: Transition,
        current: Stage,
        required: Stage,
    },

    /// The stage this transition produces is already recorded.
    #[error("attendance is already {current}")]
    AlreadyAttested { current: Stage },
}

/// Who attested a stage, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attestation {
    pub at: DateTime<Utc>,
    pub by: UserId,
}

/// One billable therapy visit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attendance {
    pub id: AttendanceId,
    pub patient_id: PatientId,
    /// The staff member credited and paid for the visit.
    pub staff_id: UserId,
    /// The actor who filed the record. Differs from `staff_id` under substitution.
    pub submitted_by: UserId,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    /// Frozen at creation. Reports sum this, never a recomputation.
    pub hours: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observations: Option<String>,
    pub is_substitution: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed: Option<Attestation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved: Option<Attestation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launched: Option<Attestation>,
    /// Incremented on every write; used for compare-and-swap updates.
    pub version: i64,
    pub created_at: DateTime<Utc>,
}

impl Attendance {
    pub const fn stage(&self) -> Stage {
        if self.launched.is_some() {
            Stage::Launched
        } else if self.approved.is_some() {
            Stage::Approved
        } else if self.confirmed.is_some() {
            Stage::Confirmed
        } else {
            Stage::Pending
        }
    }

    /// Confirmed or beyond. Only this gates billing and payment.
    pub const fn is_confirmed(&self) -> bool {
        self.confirmed.is_some()
    }

    /// Duration recomputed from the wall-clock pair, for display cross-checks only.
    pub fn recomputed_hours(&self) -> f64 {
        f64::from(hours::span_minutes(self.start_time, self.end_time)) / 60.0
    }

    /// Checks `transition` against the actor's role and the current stage.
    pub fn check(&self, transition: Transition, role: Role) -> Result<(), TransitionError> {
        if !transition.permits(role) {
            return Err(TransitionError::Forbidden { role, transition });
        }
        let current = self.stage();
        if current >= transition.to_stage() {
            return Err(TransitionError::AlreadyAttested { current });
        }
        if current != transition.from_stage() {
            return Err(TransitionError::OutOfOrder {
                transition,
                current,
                required: transition.from_stage(),
            });
        }
        Ok(())
    }

    /// Records the attestation for `transition`. Does not touch `version`.
    pub fn apply(
        &mut self,
        transition: Transition,
        actor: &Identity,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.check(transition, actor.role)?;
        let attestation = Some(Attestation {
            at,
            by: actor.id.clone(),
        });
        match transition {
            Transition::Confirm => self.confirmed = attestation,
            Transition::Approve => self.approved = attestation,
            Transition::Launch => self.launched = attestation,
        }
        Ok(())
    }
}

/// Submitted fields for a new attendance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttendance {
    pub patient_id: PatientId,
    pub date: NaiveDate,
    pub start_time: ClockTime,
    pub end_time: ClockTime,
    pub observations: Option<String>,
    pub is_substitution: bool,
}

impl NewAttendance {
    /// Freezes hours and resolves the credited staff member.
    pub fn into_attendance(
        self,
        submitter: &Identity,
        assigned_staff: Option<&UserId>,
        now: DateTime<Utc>,
    ) -> Result<Attendance, ValidationError> {
        let hours = hours::attendance_hours(self.start_time, self.end_time)?;
        let staff_id = credited_staff(self.is_substitution, submitter, assigned_staff)?.clone();
        let observations = self
            .observations
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty());
        Ok(Attendance {
            id: AttendanceId::generate(),
            patient_id: self.patient_id,
            staff_id,
            submitted_by: submitter.id.clone(),
            date: self.date,
            start_time: self.start_time,
            end_time: self.end_time,
            hours,
            observations,
            is_substitution: self.is_substitution,
            confirmed: None,
            approved: None,
            launched: None,
            version: 1,
            created_at: now,
        })
    }
}

/// The staff member whose pay a session accrues to.
///
/// A caregiver filing their own session is credited with it. Substitutions
/// credit the patient's regularly assigned caregiver, falling back to the
/// submitting caregiver when the patient has none. Sessions filed by anyone
/// other than a caregiver always go to the assigned caregiver, and are
/// rejected when the patient has none.
pub fn credited_staff<'a>(
    is_substitution: bool,
    submitter: &'a Identity,
    assigned_staff: Option<&'a UserId>,
) -> Result<&'a UserId, ValidationError> {
    match (submitter.role, is_substitution, assigned_staff) {
        (Role::Staff, true, Some(assigned)) => Ok(assigned),
        (Role::Staff, _, _) => Ok(&submitter.id),
        (_, _, Some(assigned)) => Ok(assigned),
        (role, _, None) => Err(ValidationError::NoCreditedStaff {
            role: role.to_string(),
        }),
    }
}
