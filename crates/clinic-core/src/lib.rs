//! Core domain logic for clinic attendance and billing.
//!
//! This crate contains the fundamental types and logic for:
//! - Hours: converting wall-clock pairs into billable durations
//! - Attendance: the role-gated `Pending -> Confirmed -> Approved -> Launched` lifecycle
//! - Identity: roles and sectors decoded once at the request boundary
//! - Reports: guardian billing and staff payment aggregation

pub mod attendance;
pub mod hours;
pub mod identity;
pub mod patient;
pub mod report;
pub mod supervision;
pub mod types;

pub use attendance::{Attendance, Attestation, NewAttendance, Stage, Transition, TransitionError};
pub use hours::ClockTime;
pub use identity::{Identity, Role, RoleTag};
pub use patient::{GuardianInput, NewPatient, NewUser, Patient, User};
pub use report::{GuardianBillingRow, ReportPeriod, StaffPaymentRow};
pub use supervision::{
    DEFAULT_SUPERVISION_RATE, NewSupervision, RateTable, Supervision, SupervisionRates,
};
pub use types::{
    AttendanceId, Email, PatientId, Sector, SupervisionId, UserId, ValidationError,
};
