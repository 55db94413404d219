//! Monthly financial reports, computed from the rows on every request.

use clinic_core::report::{guardian_billing, staff_payment};
use clinic_core::{GuardianBillingRow, Identity, ReportPeriod, Role, StaffPaymentRow};

use crate::attendance::{AttendanceFilter, query_attendances};
use crate::patients::{Visibility, all_patients};
use crate::supervision::{SupervisionFilter, load_rates, query_supervisions};
use crate::{Database, DbError};

impl Database {
    /// What guardians owe for `period`, one row per patient with sessions.
    pub fn guardian_billing_report(
        &self,
        actor: &Identity,
        period: ReportPeriod,
    ) -> Result<Vec<GuardianBillingRow>, DbError> {
        require_role(actor, Role::BillingGuardians, "the guardian billing report")?;
        let attendances = query_attendances(
            &self.conn,
            &AttendanceFilter::for_period(period)?,
            &Visibility::default(),
        )?;
        let patients = all_patients(&self.conn)?;
        let rows = guardian_billing(&patients, &attendances);
        tracing::debug!(
            month = period.month,
            year = period.year,
            rows = rows.len(),
            "built guardian billing report"
        );
        Ok(rows)
    }

    /// What the clinic owes each staff member for `period`.
    pub fn staff_payment_report(
        &self,
        actor: &Identity,
        period: ReportPeriod,
    ) -> Result<Vec<StaffPaymentRow>, DbError> {
        require_role(actor, Role::BillingStaff, "the staff payment report")?;
        let (from, until) = period.bounds()?;
        let attendances = query_attendances(
            &self.conn,
            &AttendanceFilter::for_period(period)?,
            &Visibility::default(),
        )?;
        let supervisions = query_supervisions(
            &self.conn,
            &SupervisionFilter {
                from: Some(from),
                until: Some(until),
                ..SupervisionFilter::default()
            },
        )?;
        let staff = self.list_users(Some(Role::Staff))?;
        let rates = load_rates(&self.conn)?;
        let rows = staff_payment(&staff, &attendances, &supervisions, &rates.rates);
        tracing::debug!(
            month = period.month,
            year = period.year,
            rows = rows.len(),
            "built staff payment report"
        );
        Ok(rows)
    }
}

fn require_role(actor: &Identity, role: Role, what: &str) -> Result<(), DbError> {
    if actor.role == role {
        Ok(())
    } else {
        Err(DbError::Forbidden(format!(
            "{what} requires role {role}, not {}",
            actor.role
        )))
    }
}
