//! Attendance persistence and lifecycle transitions.

use chrono::{DateTime, NaiveDate, Utc};
use clinic_core::{
    Attendance, AttendanceId, Attestation, Identity, NewAttendance, PatientId, ReportPeriod,
    Sector, Transition, UserId,
};
use rusqlite::{Connection, OptionalExtension, params};

use crate::patients::{Visibility, find_patient};
use crate::{
    Database, DbError, format_date, format_timestamp, parse_column, parse_date, parse_timestamp,
};

const ATTENDANCE_COLUMNS: &str = "a.id, a.patient_id, a.staff_id, a.submitted_by, a.date, \
     a.start_time, a.end_time, a.hours, a.observations, a.is_substitution, \
     a.confirmed, a.confirmed_at, a.confirmed_by, \
     a.approved, a.approved_at, a.approved_by, \
     a.launched, a.launched_at, a.launched_by, \
     a.version, a.created_at";

/// Criteria for [`Database::list_attendances`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AttendanceFilter {
    pub patient_id: Option<PatientId>,
    /// Matches the credited staff member.
    pub staff_id: Option<UserId>,
    /// Matches the patient's sector.
    pub sector: Option<Sector>,
    /// Inclusive lower bound on the session date.
    pub from: Option<NaiveDate>,
    /// Exclusive upper bound on the session date.
    pub until: Option<NaiveDate>,
}

impl AttendanceFilter {
    pub(crate) fn for_period(period: ReportPeriod) -> Result<Self, DbError> {
        let (from, until) = period.bounds()?;
        Ok(Self {
            from: Some(from),
            until: Some(until),
            ..Self::default()
        })
    }
}

#[derive(Debug)]
struct AttestationRow {
    flag: bool,
    at: Option<String>,
    by: Option<String>,
}

impl AttestationRow {
    fn into_attestation(
        self,
        column: &'static str,
        id: &str,
    ) -> Result<Option<Attestation>, DbError> {
        match (self.flag, self.at, self.by) {
            (false, _, _) => Ok(None),
            (true, Some(at), Some(by)) => Ok(Some(Attestation {
                at: parse_timestamp(&at, column, id)?,
                by: parse_column(&by, column, id)?,
            })),
            (true, _, _) => Err(crate::corrupt(
                column,
                id,
                "stage flagged without timestamp and actor",
            )),
        }
    }
}

#[derive(Debug)]
struct AttendanceRow {
    id: String,
    patient_id: String,
    staff_id: String,
    submitted_by: String,
    date: String,
    start_time: String,
    end_time: String,
    hours: f64,
    observations: Option<String>,
    is_substitution: bool,
    confirmed: AttestationRow,
    approved: AttestationRow,
    launched: AttestationRow,
    version: i64,
    created_at: String,
}

impl AttendanceRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        let attestation = |offset: usize| -> rusqlite::Result<AttestationRow> {
            Ok(AttestationRow {
                flag: row.get(offset)?,
                at: row.get(offset + 1)?,
                by: row.get(offset + 2)?,
            })
        };
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            staff_id: row.get(2)?,
            submitted_by: row.get(3)?,
            date: row.get(4)?,
            start_time: row.get(5)?,
            end_time: row.get(6)?,
            hours: row.get(7)?,
            observations: row.get(8)?,
            is_substitution: row.get(9)?,
            confirmed: attestation(10)?,
            approved: attestation(13)?,
            launched: attestation(16)?,
            version: row.get(19)?,
            created_at: row.get(20)?,
        })
    }

    fn into_attendance(self) -> Result<Attendance, DbError> {
        let id = self.id.as_str();
        Ok(Attendance {
            id: parse_column(id, "attendances.id", id)?,
            patient_id: parse_column(&self.patient_id, "attendances.patient_id", id)?,
            staff_id: parse_column(&self.staff_id, "attendances.staff_id", id)?,
            submitted_by: parse_column(&self.submitted_by, "attendances.submitted_by", id)?,
            date: parse_date(&self.date, "attendances.date", id)?,
            start_time: parse_column(&self.start_time, "attendances.start_time", id)?,
            end_time: parse_column(&self.end_time, "attendances.end_time", id)?,
            hours: self.hours,
            observations: self.observations,
            is_substitution: self.is_substitution,
            confirmed: self.confirmed.into_attestation("attendances.confirmed", id)?,
            approved: self.approved.into_attestation("attendances.approved", id)?,
            launched: self.launched.into_attestation("attendances.launched", id)?,
            version: self.version,
            created_at: parse_timestamp(&self.created_at, "attendances.created_at", id)?,
        })
    }
}

impl Database {
    /// Records a session.
    ///
    /// Hours are computed here and never recomputed. A substitution is
    /// credited to the patient's assigned staff member when there is one.
    pub fn create_attendance(
        &mut self,
        actor: &Identity,
        draft: NewAttendance,
    ) -> Result<Attendance, DbError> {
        self.create_attendance_at(actor, draft, Utc::now())
    }

    pub fn create_attendance_at(
        &mut self,
        actor: &Identity,
        draft: NewAttendance,
        now: DateTime<Utc>,
    ) -> Result<Attendance, DbError> {
        if !actor.role.can_submit_attendance() {
            return Err(DbError::Forbidden(format!(
                "role {} may not submit attendances",
                actor.role
            )));
        }
        let tx = self.conn.transaction()?;
        let patient = find_patient(&tx, &draft.patient_id)?
            .ok_or_else(|| DbError::not_found("patient", &draft.patient_id))?;
        if !actor.covers(patient.sector) {
            return Err(DbError::Forbidden(format!(
                "patient belongs to sector {}, outside the actor's sector",
                patient.sector
            )));
        }
        let attendance =
            draft.into_attendance(actor, patient.assigned_staff_id.as_ref(), now)?;
        tx.execute(
            "
            INSERT INTO attendances (
                id, patient_id, staff_id, submitted_by, date, start_time, end_time,
                hours, observations, is_substitution, version, created_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                attendance.id.as_str(),
                attendance.patient_id.as_str(),
                attendance.staff_id.as_str(),
                attendance.submitted_by.as_str(),
                format_date(attendance.date),
                attendance.start_time.to_string(),
                attendance.end_time.to_string(),
                attendance.hours,
                attendance.observations,
                attendance.is_substitution,
                attendance.version,
                format_timestamp(attendance.created_at),
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            attendance_id = %attendance.id,
            patient_id = %attendance.patient_id,
            staff_id = %attendance.staff_id,
            substitution = attendance.is_substitution,
            hours = attendance.hours,
            "created attendance"
        );
        Ok(attendance)
    }

    pub fn confirm_attendance(
        &mut self,
        actor: &Identity,
        id: &AttendanceId,
    ) -> Result<Attendance, DbError> {
        self.transition_attendance_at(actor, id, Transition::Confirm, None, Utc::now())
    }

    pub fn approve_attendance(
        &mut self,
        actor: &Identity,
        id: &AttendanceId,
    ) -> Result<Attendance, DbError> {
        self.transition_attendance_at(actor, id, Transition::Approve, None, Utc::now())
    }

    pub fn launch_attendance(
        &mut self,
        actor: &Identity,
        id: &AttendanceId,
    ) -> Result<Attendance, DbError> {
        self.transition_attendance_at(actor, id, Transition::Launch, None, Utc::now())
    }

    /// Moves an attendance one stage forward.
    ///
    /// When `expected_version` is given it must match the stored version. The
    /// write itself is conditional on the version that was read, so two
    /// concurrent transitions cannot both succeed.
    pub fn transition_attendance_at(
        &mut self,
        actor: &Identity,
        id: &AttendanceId,
        transition: Transition,
        expected_version: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<Attendance, DbError> {
        let tx = self.conn.transaction()?;
        let mut attendance =
            find_attendance(&tx, id)?.ok_or_else(|| DbError::not_found("attendance", id))?;
        ensure_covers_patient(&tx, actor, &attendance.patient_id)?;

        let read_version = attendance.version;
        if let Some(expected) = expected_version {
            if expected != read_version {
                return Err(stale(id, expected, read_version));
            }
        }
        attendance.apply(transition, actor, now)?;
        attendance.version = read_version + 1;

        let stage = transition.to_stage().as_str();
        let updated = tx.execute(
            &format!(
                "
                UPDATE attendances
                SET {stage} = 1, {stage}_at = ?1, {stage}_by = ?2, version = ?3
                WHERE id = ?4 AND version = ?5
                "
            ),
            params![
                format_timestamp(now),
                actor.id.as_str(),
                attendance.version,
                id.as_str(),
                read_version,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::Conflict(format!(
                "attendance {id} was modified concurrently"
            )));
        }
        tx.commit()?;

        tracing::info!(
            attendance_id = %id,
            transition = %transition,
            actor = %actor.id,
            version = attendance.version,
            "attendance transitioned"
        );
        Ok(attendance)
    }

    /// Rejects an attendance by deleting it, whatever its stage.
    pub fn delete_attendance(
        &mut self,
        actor: &Identity,
        id: &AttendanceId,
    ) -> Result<(), DbError> {
        if !actor.role.can_confirm() {
            return Err(DbError::Forbidden(format!(
                "role {} may not delete attendances",
                actor.role
            )));
        }
        let tx = self.conn.transaction()?;
        let attendance =
            find_attendance(&tx, id)?.ok_or_else(|| DbError::not_found("attendance", id))?;
        ensure_covers_patient(&tx, actor, &attendance.patient_id)?;
        tx.execute("DELETE FROM attendances WHERE id = ?", [id.as_str()])?;
        tx.commit()?;
        tracing::info!(
            attendance_id = %id,
            stage = %attendance.stage(),
            actor = %actor.id,
            "deleted attendance"
        );
        Ok(())
    }

    /// Fetches one attendance, provided the actor may see its patient.
    pub fn get_attendance(
        &self,
        actor: &Identity,
        id: &AttendanceId,
    ) -> Result<Attendance, DbError> {
        let attendance =
            find_attendance(&self.conn, id)?.ok_or_else(|| DbError::not_found("attendance", id))?;
        let patient = find_patient(&self.conn, &attendance.patient_id)?
            .ok_or_else(|| DbError::not_found("patient", &attendance.patient_id))?;
        if !Visibility::of(&self.conn, actor)?.admits(&patient) {
            return Err(DbError::Forbidden(format!(
                "attendance {id} belongs to a patient the actor cannot see"
            )));
        }
        Ok(attendance)
    }

    /// Lists attendances matching `filter`, oldest session first.
    ///
    /// Only sessions of patients the actor can see are returned, as with
    /// [`Database::list_patients`].
    pub fn list_attendances(
        &self,
        actor: &Identity,
        filter: &AttendanceFilter,
    ) -> Result<Vec<Attendance>, DbError> {
        query_attendances(&self.conn, filter, &Visibility::of(&self.conn, actor)?)
    }

    /// Attendances in `period` that `staff_id` is credited with or submitted.
    ///
    /// Substitutions therefore appear in both the substitute's and the regular
    /// caregiver's history. Scoped to the actor like [`Database::list_attendances`].
    pub fn staff_history(
        &self,
        actor: &Identity,
        staff_id: &UserId,
        period: ReportPeriod,
    ) -> Result<Vec<Attendance>, DbError> {
        let (from, until) = period.bounds()?;
        let scope = Visibility::of(&self.conn, actor)?;
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {ATTENDANCE_COLUMNS}
            FROM attendances a
            JOIN patients p ON p.id = a.patient_id
            WHERE (a.staff_id = ?1 OR a.submitted_by = ?1)
              AND a.date >= ?2 AND a.date < ?3
              AND (?4 IS NULL OR p.sector = ?4)
              AND (?5 IS NULL OR p.guardian_email = ?5 OR p.guardian_email_2 = ?5)
            ORDER BY a.date ASC, a.start_time ASC, a.id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![
                staff_id.as_str(),
                format_date(from),
                format_date(until),
                scope.sector_param(),
                scope.guardian_param(),
            ],
            AttendanceRow::from_row,
        )?;
        collect(rows)
    }
}

fn stale(id: &AttendanceId, expected: i64, actual: i64) -> DbError {
    DbError::Conflict(format!(
        "attendance {id} is at version {actual}, expected {expected}"
    ))
}

fn ensure_covers_patient(
    conn: &Connection,
    actor: &Identity,
    patient_id: &PatientId,
) -> Result<(), DbError> {
    let patient =
        find_patient(conn, patient_id)?.ok_or_else(|| DbError::not_found("patient", patient_id))?;
    if actor.covers(patient.sector) {
        Ok(())
    } else {
        Err(DbError::Forbidden(format!(
            "attendance belongs to sector {}, outside the actor's sector",
            patient.sector
        )))
    }
}

fn find_attendance(conn: &Connection, id: &AttendanceId) -> Result<Option<Attendance>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {ATTENDANCE_COLUMNS} FROM attendances a WHERE a.id = ?"),
            [id.as_str()],
            AttendanceRow::from_row,
        )
        .optional()?;
    row.map(AttendanceRow::into_attendance).transpose()
}

pub(crate) fn query_attendances(
    conn: &Connection,
    filter: &AttendanceFilter,
    scope: &Visibility,
) -> Result<Vec<Attendance>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {ATTENDANCE_COLUMNS}
        FROM attendances a
        JOIN patients p ON p.id = a.patient_id
        WHERE (?1 IS NULL OR a.patient_id = ?1)
          AND (?2 IS NULL OR a.staff_id = ?2)
          AND (?3 IS NULL OR p.sector = ?3)
          AND (?4 IS NULL OR a.date >= ?4)
          AND (?5 IS NULL OR a.date < ?5)
          AND (?6 IS NULL OR p.sector = ?6)
          AND (?7 IS NULL OR p.guardian_email = ?7 OR p.guardian_email_2 = ?7)
        ORDER BY a.date ASC, a.start_time ASC, a.id ASC
        "
    ))?;
    let rows = stmt.query_map(
        params![
            filter.patient_id.as_ref().map(PatientId::as_str),
            filter.staff_id.as_ref().map(UserId::as_str),
            filter.sector.map(|sector| sector.as_str()),
            filter.from.map(format_date),
            filter.until.map(format_date),
            scope.sector_param(),
            scope.guardian_param(),
        ],
        AttendanceRow::from_row,
    )?;
    collect(rows)
}

fn collect(
    rows: impl Iterator<Item = rusqlite::Result<AttendanceRow>>,
) -> Result<Vec<Attendance>, DbError> {
    let mut attendances = Vec::new();
    for row in rows {
        attendances.push(row?.into_attendance()?);
    }
    Ok(attendances)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_patient, add_user, at, count, day, seeded};
    use clinic_core::{Email, Role, Stage, TransitionError, ValidationError};

    fn session(patient_id: &PatientId, date: NaiveDate, start: &str, end: &str) -> NewAttendance {
        NewAttendance {
            patient_id: patient_id.clone(),
            date,
            start_time: start.parse().unwrap(),
            end_time: end.parse().unwrap(),
            observations: None,
            is_substitution: false,
        }
    }

    struct Clinic {
        db: Database,
        admin: Identity,
        staff: Identity,
        reception: Identity,
        patient: clinic_core::Patient,
    }

    fn clinic() -> Clinic {
        let (mut db, admin) = seeded();
        let staff = add_user(&mut db, &admin, "Rita", "staff:aba", 40.0);
        let reception = add_user(&mut db, &admin, "Desk", "reception", 0.0);
        let patient = add_patient(&mut db, &admin, "Lucas", Some(&staff.id), &[]);
        Clinic {
            db,
            admin,
            staff,
            reception,
            patient,
        }
    }

    #[test]
    fn created_attendance_is_pending_with_frozen_hours() {
        let mut c = clinic();
        let created = c
            .db
            .create_attendance_at(
                &c.staff,
                session(&c.patient.id, day(2025, 3, 10), "23:00", "01:00"),
                at("2025-03-10T23:00:00Z"),
            )
            .unwrap();
        assert_eq!(created.stage(), Stage::Pending);
        assert!((created.hours - 2.0).abs() < f64::EPSILON);

        let stored = c.db.get_attendance(&c.admin, &created.id).unwrap();
        assert_eq!(stored, created);
    }

    #[test]
    fn zero_length_session_is_rejected() {
        let mut c = clinic();
        let err = c
            .db
            .create_attendance(
                &c.staff,
                session(&c.patient.id, day(2025, 3, 10), "09:00", "09:00"),
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Invalid(ValidationError::NonPositiveDuration)
        ));
        assert_eq!(count(&c.db, "SELECT COUNT(*) FROM attendances"), 0);
    }

    #[test]
    fn unknown_patient_is_not_found() {
        let mut c = clinic();
        let missing = PatientId::new("ghost").unwrap();
        let err = c
            .db
            .create_attendance(&c.staff, session(&missing, day(2025, 3, 10), "09:00", "10:00"))
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { entity: "patient", .. }));
    }

    #[test]
    fn guardians_cannot_submit() {
        let mut c = clinic();
        let guardian = Identity::new(UserId::new("g1").unwrap(), "guardian".parse().unwrap());
        let err = c
            .db
            .create_attendance(
                &guardian,
                session(&c.patient.id, day(2025, 3, 10), "09:00", "10:00"),
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));
    }

    #[test]
    fn substitution_is_credited_to_assigned_staff() {
        let mut c = clinic();
        let substitute = add_user(&mut c.db, &c.admin, "Sam", "staff:aba", 30.0);
        let mut draft = session(&c.patient.id, day(2025, 3, 11), "09:00", "10:30");
        draft.is_substitution = true;
        let created = c.db.create_attendance(&substitute, draft).unwrap();
        assert_eq!(created.staff_id, c.staff.id);
        assert_eq!(created.submitted_by, substitute.id);

        let period = ReportPeriod::new(3, 2025).unwrap();
        assert_eq!(c.db.staff_history(&c.admin, &substitute.id, period).unwrap().len(), 1);
        assert_eq!(c.db.staff_history(&c.admin, &c.staff.id, period).unwrap().len(), 1);
        let credited = c
            .db
            .list_attendances(
                &c.admin,
                &AttendanceFilter {
                    staff_id: Some(substitute.id.clone()),
                    ..AttendanceFilter::default()
                },
            )
            .unwrap();
        assert!(credited.is_empty());
    }

    #[test]
    fn full_lifecycle_records_each_attestation() {
        let mut c = clinic();
        let created = c
            .db
            .create_attendance(&c.staff, session(&c.patient.id, day(2025, 3, 10), "09:00", "10:00"))
            .unwrap();

        let confirmed = c
            .db
            .transition_attendance_at(
                &c.reception,
                &created.id,
                Transition::Confirm,
                None,
                at("2025-03-11T09:00:00Z"),
            )
            .unwrap();
        assert_eq!(confirmed.stage(), Stage::Confirmed);
        assert_eq!(confirmed.version, 2);

        c.db.approve_attendance(&c.admin, &created.id).unwrap();
        let launched = c.db.launch_attendance(&c.admin, &created.id).unwrap();
        assert_eq!(launched.stage(), Stage::Launched);

        let stored = c.db.get_attendance(&c.admin, &created.id).unwrap();
        assert_eq!(stored.version, 4);
        let confirmation = stored.confirmed.unwrap();
        assert_eq!(confirmation.by, c.reception.id);
        assert_eq!(confirmation.at, at("2025-03-11T09:00:00Z"));
        assert_eq!(stored.approved.unwrap().by, c.admin.id);
        assert_eq!(stored.launched.unwrap().by, c.admin.id);
    }

    #[test]
    fn stages_cannot_be_skipped_or_repeated() {
        let mut c = clinic();
        let created = c
            .db
            .create_attendance(&c.staff, session(&c.patient.id, day(2025, 3, 10), "09:00", "10:00"))
            .unwrap();

        let err = c.db.approve_attendance(&c.admin, &created.id).unwrap_err();
        assert!(matches!(
            err,
            DbError::Transition(TransitionError::OutOfOrder { .. })
        ));

        c.db.confirm_attendance(&c.reception, &created.id).unwrap();
        let err = c.db.confirm_attendance(&c.admin, &created.id).unwrap_err();
        assert!(matches!(
            err,
            DbError::Transition(TransitionError::AlreadyAttested {
                current: Stage::Confirmed
            })
        ));
        assert_eq!(err.kind(), crate::ErrorKind::Conflict);
        assert_eq!(c.db.get_attendance(&c.admin, &created.id).unwrap().version, 2);
    }

    #[test]
    fn reception_cannot_approve_or_launch() {
        let mut c = clinic();
        let created = c
            .db
            .create_attendance(&c.staff, session(&c.patient.id, day(2025, 3, 10), "09:00", "10:00"))
            .unwrap();
        c.db.confirm_attendance(&c.reception, &created.id).unwrap();
        let err = c.db.approve_attendance(&c.reception, &created.id).unwrap_err();
        assert!(matches!(
            err,
            DbError::Transition(TransitionError::Forbidden {
                role: Role::Reception,
                ..
            })
        ));
        assert_eq!(err.kind(), crate::ErrorKind::Forbidden);
    }

    #[test]
    fn sector_admin_only_acts_within_sector() {
        let mut c = clinic();
        let denver = add_user(&mut c.db, &c.admin, "Dora", "sector_admin:denver", 0.0);
        let aba = add_user(&mut c.db, &c.admin, "Abel", "sector_admin:aba", 0.0);
        let created = c
            .db
            .create_attendance(&c.staff, session(&c.patient.id, day(2025, 3, 10), "09:00", "10:00"))
            .unwrap();
        assert!(matches!(
            c.db.confirm_attendance(&denver, &created.id),
            Err(DbError::Forbidden(_))
        ));
        c.db.confirm_attendance(&aba, &created.id).unwrap();
    }

    #[test]
    fn stale_version_is_a_conflict() {
        let mut c = clinic();
        let created = c
            .db
            .create_attendance(&c.staff, session(&c.patient.id, day(2025, 3, 10), "09:00", "10:00"))
            .unwrap();
        c.db.confirm_attendance(&c.reception, &created.id).unwrap();

        let err = c
            .db
            .transition_attendance_at(
                &c.admin,
                &created.id,
                Transition::Approve,
                Some(created.version),
                Utc::now(),
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
        assert_eq!(c.db.get_attendance(&c.admin, &created.id).unwrap().stage(), Stage::Confirmed);
    }

    #[test]
    fn delete_is_gated_by_role_and_allowed_in_any_stage() {
        let mut c = clinic();
        let created = c
            .db
            .create_attendance(&c.staff, session(&c.patient.id, day(2025, 3, 10), "09:00", "10:00"))
            .unwrap();
        assert!(matches!(
            c.db.delete_attendance(&c.staff, &created.id),
            Err(DbError::Forbidden(_))
        ));

        c.db.confirm_attendance(&c.reception, &created.id).unwrap();
        c.db.approve_attendance(&c.admin, &created.id).unwrap();
        c.db.launch_attendance(&c.admin, &created.id).unwrap();
        c.db.delete_attendance(&c.reception, &created.id).unwrap();
        assert!(matches!(
            c.db.get_attendance(&c.admin, &created.id),
            Err(DbError::NotFound { .. })
        ));
        assert!(matches!(
            c.db.delete_attendance(&c.reception, &created.id),
            Err(DbError::NotFound { .. })
        ));
    }

    #[test]
    fn reads_are_scoped_to_patients_the_actor_can_see() {
        let mut c = clinic();
        let bia = add_patient(
            &mut c.db,
            &c.admin,
            "Bia",
            Some(&c.staff.id),
            &[("mom@mail.com", Some("Mom"))],
        );
        let lucas_session = c
            .db
            .create_attendance(&c.staff, session(&c.patient.id, day(2025, 3, 3), "09:00", "10:00"))
            .unwrap();
        let bia_session = c
            .db
            .create_attendance(&c.staff, session(&bia.id, day(2025, 3, 4), "09:00", "10:00"))
            .unwrap();

        let mom = c
            .db
            .find_user_by_email(&Email::parse("mom@mail.com").unwrap())
            .unwrap()
            .unwrap()
            .identity();
        let seen: Vec<AttendanceId> = c
            .db
            .list_attendances(&mom, &AttendanceFilter::default())
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(seen, [bia_session.id.clone()]);
        assert_eq!(c.db.get_attendance(&mom, &bia_session.id).unwrap().id, bia_session.id);
        assert!(matches!(
            c.db.get_attendance(&mom, &lucas_session.id),
            Err(DbError::Forbidden(_))
        ));
        let march = ReportPeriod::new(3, 2025).unwrap();
        assert_eq!(c.db.staff_history(&mom, &c.staff.id, march).unwrap().len(), 1);
        assert_eq!(c.db.staff_history(&c.staff, &c.staff.id, march).unwrap().len(), 2);

        let dora = add_user(&mut c.db, &c.admin, "Dora", "staff:denver", 40.0);
        let visible = c.db.list_attendances(&dora, &AttendanceFilter::default()).unwrap();
        assert!(visible.is_empty());
        assert!(matches!(
            c.db.get_attendance(&dora, &bia_session.id),
            Err(DbError::Forbidden(_))
        ));

        let desk = c.db.list_attendances(&c.reception, &AttendanceFilter::default()).unwrap();
        assert_eq!(desk.len(), 2);
    }

    #[test]
    fn list_filters_by_date_range_and_sector() {
        let mut c = clinic();
        for date in [day(2025, 2, 28), day(2025, 3, 1), day(2025, 3, 31), day(2025, 4, 1)] {
            c.db
                .create_attendance(&c.staff, session(&c.patient.id, date, "09:00", "10:00"))
                .unwrap();
        }
        let march = c
            .db
            .list_attendances(
                &c.admin,
                &AttendanceFilter::for_period(ReportPeriod::new(3, 2025).unwrap()).unwrap(),
            )
            .unwrap();
        let dates: Vec<NaiveDate> = march.iter().map(|a| a.date).collect();
        assert_eq!(dates, [day(2025, 3, 1), day(2025, 3, 31)]);

        let denver = c
            .db
            .list_attendances(
                &c.admin,
                &AttendanceFilter {
                    sector: Some(Sector::Denver),
                    ..AttendanceFilter::default()
                },
            )
            .unwrap();
        assert!(denver.is_empty());

        let by_patient = c
            .db
            .list_attendances(
                &c.admin,
                &AttendanceFilter {
                    patient_id: Some(c.patient.id.clone()),
                    ..AttendanceFilter::default()
                },
            )
            .unwrap();
        assert_eq!(by_patient.len(), 4);
    }
}
