//! Patient registration and removal.
//!
//! Creating a patient provisions any missing guardian users. Deleting one
//! removes its attendances, then each guardian no other patient still
//! references, then the patient row.

use chrono::{DateTime, Utc};
use clinic_core::patient::GuardianRef;
use clinic_core::{Email, Identity, NewPatient, Patient, PatientId, Role, Sector, User, UserId};
use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;

use crate::credential::hash_credential;
use crate::users::{find_user, find_user_by_email, store_user};
use crate::{
    DEFAULT_GUARDIAN_CREDENTIAL, Database, DbError, format_timestamp, parse_column,
    parse_timestamp,
};

const PATIENT_COLUMNS: &str = "id, name, sector, weekly_hours, hourly_rate, assigned_staff_id, \
     parent_id, guardian_email, guardian_email_2, created_at";

/// What a patient deletion removed and kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PatientDeletion {
    pub patient_id: PatientId,
    pub attendances_deleted: usize,
    pub guardians_deleted: Vec<Email>,
    /// Still referenced by another patient.
    pub guardians_retained: Vec<Email>,
    /// Deletion was attempted and failed; the user row may be orphaned.
    pub guardians_failed: Vec<Email>,
}

#[derive(Debug)]
struct PatientRow {
    id: String,
    name: String,
    sector: String,
    weekly_hours: f64,
    hourly_rate: f64,
    assigned_staff_id: Option<String>,
    parent_id: Option<String>,
    guardian_email: Option<String>,
    guardian_email_2: Option<String>,
    created_at: String,
}

impl PatientRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            sector: row.get(2)?,
            weekly_hours: row.get(3)?,
            hourly_rate: row.get(4)?,
            assigned_staff_id: row.get(5)?,
            parent_id: row.get(6)?,
            guardian_email: row.get(7)?,
            guardian_email_2: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_patient(self) -> Result<Patient, DbError> {
        let id = self.id.as_str();
        let optional_id = |value: Option<&str>, column| {
            value
                .map(|value| parse_column::<UserId>(value, column, id))
                .transpose()
        };
        let optional_email = |value: Option<&str>, column| {
            value
                .map(|value| parse_column::<Email>(value, column, id))
                .transpose()
        };
        Ok(Patient {
            id: parse_column(id, "patients.id", id)?,
            sector: parse_column(&self.sector, "patients.sector", id)?,
            assigned_staff_id: optional_id(
                self.assigned_staff_id.as_deref(),
                "patients.assigned_staff_id",
            )?,
            parent_id: optional_id(self.parent_id.as_deref(), "patients.parent_id")?,
            guardian_email: optional_email(
                self.guardian_email.as_deref(),
                "patients.guardian_email",
            )?,
            guardian_email_2: optional_email(
                self.guardian_email_2.as_deref(),
                "patients.guardian_email_2",
            )?,
            created_at: parse_timestamp(&self.created_at, "patients.created_at", id)?,
            name: self.name,
            weekly_hours: self.weekly_hours,
            hourly_rate: self.hourly_rate,
        })
    }
}

impl Database {
    /// Registers a patient, provisioning guardian users as needed.
    pub fn create_patient(
        &mut self,
        actor: &Identity,
        draft: NewPatient,
    ) -> Result<Patient, DbError> {
        self.create_patient_at(actor, draft, Utc::now())
    }

    pub fn create_patient_at(
        &mut self,
        actor: &Identity,
        draft: NewPatient,
        now: DateTime<Utc>,
    ) -> Result<Patient, DbError> {
        ensure_manages(actor, draft.sector)?;
        let draft = draft.validate()?;

        let tx = self.conn.transaction()?;
        if let Some(staff_id) = &draft.assigned_staff_id {
            let staff =
                find_user(&tx, staff_id)?.ok_or_else(|| DbError::not_found("user", staff_id))?;
            if !staff.is_staff() {
                return Err(DbError::Conflict(format!(
                    "assigned user {staff_id} is not a staff member"
                )));
            }
        }

        let mut guardians = Vec::with_capacity(draft.guardians.len());
        for guardian in &draft.guardians {
            guardians.push(resolve_guardian(&tx, guardian, now)?);
        }

        let patient = Patient {
            id: PatientId::generate(),
            name: draft.name,
            sector: draft.sector,
            weekly_hours: draft.weekly_hours,
            hourly_rate: draft.hourly_rate,
            assigned_staff_id: draft.assigned_staff_id,
            parent_id: guardians.first().map(|user| user.id.clone()),
            guardian_email: guardians.first().map(|user| user.email.clone()),
            guardian_email_2: guardians.get(1).map(|user| user.email.clone()),
            created_at: now,
        };
        tx.execute(
            &format!(
                "INSERT INTO patients ({PATIENT_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                patient.id.as_str(),
                patient.name,
                patient.sector.as_str(),
                patient.weekly_hours,
                patient.hourly_rate,
                patient.assigned_staff_id.as_ref().map(UserId::as_str),
                patient.parent_id.as_ref().map(UserId::as_str),
                patient.guardian_email.as_ref().map(Email::as_str),
                patient.guardian_email_2.as_ref().map(Email::as_str),
                format_timestamp(patient.created_at),
            ],
        )?;
        tx.commit()?;

        tracing::info!(patient_id = %patient.id, sector = %patient.sector, "created patient");
        Ok(patient)
    }

    /// Deletes a patient, its attendances and any guardian left unreferenced.
    ///
    /// Attendance deletion failing aborts everything. A guardian that cannot be
    /// deleted is logged, reported in [`PatientDeletion::guardians_failed`] and
    /// skipped.
    pub fn delete_patient(
        &mut self,
        actor: &Identity,
        id: &PatientId,
    ) -> Result<PatientDeletion, DbError> {
        let mut tx = self.conn.transaction()?;
        let patient = find_patient(&tx, id)?.ok_or_else(|| DbError::not_found("patient", id))?;
        ensure_manages(actor, patient.sector)?;

        let attendances_deleted =
            tx.execute("DELETE FROM attendances WHERE patient_id = ?", [id.as_str()])?;

        let mut outcome = PatientDeletion {
            patient_id: id.clone(),
            attendances_deleted,
            guardians_deleted: Vec::new(),
            guardians_retained: Vec::new(),
            guardians_failed: Vec::new(),
        };

        // The patient row is still present here; the reference check excludes it by id.
        for email in patient.guardian_emails() {
            let mut savepoint = tx.savepoint()?;
            match release_guardian(&savepoint, email, id) {
                Ok(true) => {
                    savepoint.commit()?;
                    outcome.guardians_deleted.push(email.clone());
                }
                Ok(false) => {
                    savepoint.commit()?;
                    outcome.guardians_retained.push(email.clone());
                }
                Err(err) => {
                    savepoint.rollback()?;
                    tracing::warn!(
                        patient_id = %id,
                        guardian = %email,
                        error = %err,
                        "failed to delete guardian; continuing"
                    );
                    outcome.guardians_failed.push(email.clone());
                }
            }
        }

        tx.execute("DELETE FROM patients WHERE id = ?", [id.as_str()])?;
        tx.commit()?;

        tracing::info!(
            patient_id = %id,
            attendances = outcome.attendances_deleted,
            guardians_deleted = outcome.guardians_deleted.len(),
            "deleted patient"
        );
        Ok(outcome)
    }

    pub fn get_patient(&self, id: &PatientId) -> Result<Patient, DbError> {
        find_patient(&self.conn, id)?.ok_or_else(|| DbError::not_found("patient", id))
    }

    /// Lists patients the actor can see, ordered by name.
    ///
    /// Guardians see their own children; sector admins and staff their sector.
    pub fn list_patients(&self, actor: &Identity) -> Result<Vec<Patient>, DbError> {
        let scope = Visibility::of(&self.conn, actor)?;
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {PATIENT_COLUMNS}
            FROM patients
            WHERE (?1 IS NULL OR sector = ?1)
              AND (?2 IS NULL OR guardian_email = ?2 OR guardian_email_2 = ?2)
            ORDER BY name ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map(
            params![scope.sector_param(), scope.guardian_param()],
            PatientRow::from_row,
        )?;
        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.into_patient()?);
        }
        Ok(patients)
    }
}

/// Which patients, and so which attendances, an actor may read.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct Visibility {
    sector: Option<Sector>,
    guardian_email: Option<Email>,
}

impl Visibility {
    pub(crate) fn of(conn: &Connection, actor: &Identity) -> Result<Self, DbError> {
        let guardian_email = if actor.role == Role::Guardian {
            let user =
                find_user(conn, &actor.id)?.ok_or_else(|| DbError::not_found("user", &actor.id))?;
            Some(user.email)
        } else {
            None
        };
        let sector = match actor.role {
            Role::Staff | Role::SectorAdmin => actor.sector,
            _ => None,
        };
        Ok(Self {
            sector,
            guardian_email,
        })
    }

    pub(crate) fn admits(&self, patient: &Patient) -> bool {
        let in_sector = self.sector.is_none_or(|sector| sector == patient.sector);
        let is_guardian = self
            .guardian_email
            .as_ref()
            .is_none_or(|email| patient.guardian_emails().any(|own| own == email));
        in_sector && is_guardian
    }

    pub(crate) fn sector_param(&self) -> Option<&'static str> {
        self.sector.map(|sector| sector.as_str())
    }

    pub(crate) fn guardian_param(&self) -> Option<&str> {
        self.guardian_email.as_ref().map(Email::as_str)
    }
}

fn ensure_manages(actor: &Identity, sector: Sector) -> Result<(), DbError> {
    if !actor.role.can_manage_patients() {
        return Err(DbError::Forbidden(format!(
            "role {} may not manage patients",
            actor.role
        )));
    }
    if !actor.covers(sector) {
        return Err(DbError::Forbidden(format!(
            "patient belongs to sector {sector}, outside the actor's sector"
        )));
    }
    Ok(())
}

/// Finds the guardian user for `guardian`, creating it when absent.
fn resolve_guardian(
    conn: &Connection,
    guardian: &GuardianRef,
    now: DateTime<Utc>,
) -> Result<User, DbError> {
    if let Some(existing) = find_user_by_email(conn, &guardian.email)? {
        if existing.role != Role::Guardian {
            return Err(DbError::Conflict(format!(
                "{} is registered to a {} user, not a guardian",
                guardian.email, existing.role
            )));
        }
        tracing::debug!(guardian = %guardian.email, "reusing existing guardian");
        return Ok(existing);
    }

    let user = User {
        id: UserId::generate(),
        name: guardian.name_for_provisioning()?,
        email: guardian.email.clone(),
        role: Role::Guardian,
        sector: None,
        hourly_rate: 0.0,
        active: true,
        created_at: now,
    };
    store_user(conn, &user, &hash_credential(DEFAULT_GUARDIAN_CREDENTIAL)?)?;
    tracing::info!(guardian = %user.email, user_id = %user.id, "provisioned guardian");
    Ok(user)
}

/// Deletes the guardian with `email` unless a patient other than `owner`
/// still references it. Returns whether a row was deleted.
fn release_guardian(conn: &Connection, email: &Email, owner: &PatientId) -> Result<bool, DbError> {
    let still_referenced: i64 = conn.query_row(
        "
        SELECT COUNT(*) FROM patients
        WHERE id != ?1 AND (guardian_email = ?2 OR guardian_email_2 = ?2)
        ",
        params![owner.as_str(), email.as_str()],
        |row| row.get(0),
    )?;
    if still_referenced > 0 {
        return Ok(false);
    }
    let deleted = conn.execute(
        "DELETE FROM users WHERE email = ? AND role = ?",
        params![email.as_str(), Role::Guardian.as_str()],
    )?;
    Ok(deleted > 0)
}

pub(crate) fn find_patient(conn: &Connection, id: &PatientId) -> Result<Option<Patient>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {PATIENT_COLUMNS} FROM patients WHERE id = ?"),
            [id.as_str()],
            PatientRow::from_row,
        )
        .optional()?;
    row.map(PatientRow::into_patient).transpose()
}

pub(crate) fn all_patients(conn: &Connection) -> Result<Vec<Patient>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {PATIENT_COLUMNS} FROM patients ORDER BY name ASC, id ASC"
    ))?;
    let rows = stmt.query_map([], PatientRow::from_row)?;
    let mut patients = Vec::new();
    for row in rows {
        patients.push(row?.into_patient()?);
    }
    Ok(patients)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{add_patient, add_user, count, seeded};
    use clinic_core::{GuardianInput, ValidationError};

    #[test]
    fn creation_provisions_guardians_and_links_first_by_id() {
        let (mut db, admin) = seeded();
        let patient = add_patient(
            &mut db,
            &admin,
            "Lucas",
            None,
            &[
                (" Ana@Mail.com ", Some("Ana")),
                ("bruno@mail.com", Some("Bruno")),
            ],
        );

        let ana = db
            .find_user_by_email(&Email::parse("ana@mail.com").unwrap())
            .unwrap()
            .expect("first guardian provisioned");
        assert_eq!(ana.role, Role::Guardian);
        assert!(ana.active);
        assert_eq!(patient.parent_id.as_ref(), Some(&ana.id));
        assert_eq!(
            patient.guardian_email.as_ref().map(Email::as_str),
            Some("ana@mail.com")
        );
        assert_eq!(
            patient.guardian_email_2.as_ref().map(Email::as_str),
            Some("bruno@mail.com")
        );
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users WHERE role = 'guardian'"), 2);

        let stored = db.get_patient(&patient.id).unwrap();
        assert_eq!(stored.name, "Lucas");
        assert_eq!(stored.parent_id, patient.parent_id);
        assert_eq!(stored.guardian_email_2, patient.guardian_email_2);
    }

    #[test]
    fn guardian_provisioning_is_idempotent() {
        let (mut db, admin) = seeded();
        let first = add_patient(&mut db, &admin, "Lucas", None, &[("ana@mail.com", Some("Ana"))]);
        let second = add_patient(&mut db, &admin, "Maria", None, &[("ANA@mail.com", None)]);
        assert_eq!(first.parent_id, second.parent_id);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users WHERE role = 'guardian'"), 1);
    }

    #[test]
    fn new_guardian_without_name_is_rejected_and_nothing_is_written() {
        let (mut db, admin) = seeded();
        let err = db
            .create_patient(
                &admin,
                NewPatient {
                    name: "Lucas".to_string(),
                    sector: Sector::Aba,
                    weekly_hours: 10.0,
                    hourly_rate: 60.0,
                    assigned_staff_id: None,
                    guardians: vec![
                        GuardianInput {
                            email: "ana@mail.com".to_string(),
                            name: Some("Ana".to_string()),
                        },
                        GuardianInput {
                            email: "new@mail.com".to_string(),
                            name: None,
                        },
                    ],
                },
            )
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Invalid(ValidationError::MissingGuardianName { .. })
        ));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users WHERE role = 'guardian'"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM patients"), 0);
    }

    #[test]
    fn guardian_email_owned_by_staff_is_a_conflict() {
        let (mut db, admin) = seeded();
        add_user(&mut db, &admin, "Rita", "staff:aba", 40.0);
        let err = db
            .create_patient(
                &admin,
                NewPatient {
                    name: "Lucas".to_string(),
                    sector: Sector::Aba,
                    weekly_hours: 10.0,
                    hourly_rate: 60.0,
                    assigned_staff_id: None,
                    guardians: vec![GuardianInput {
                        email: "rita@clinic.com".to_string(),
                        name: None,
                    }],
                },
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Conflict(_)));
    }

    #[test]
    fn assigned_staff_must_exist_and_be_staff() {
        let (mut db, admin) = seeded();
        let missing = UserId::new("ghost").unwrap();
        let err = db
            .create_patient(
                &admin,
                NewPatient {
                    name: "Lucas".to_string(),
                    sector: Sector::Aba,
                    weekly_hours: 10.0,
                    hourly_rate: 60.0,
                    assigned_staff_id: Some(missing),
                    guardians: Vec::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { entity: "user", .. }));
    }

    #[test]
    fn sector_admin_cannot_register_outside_sector() {
        let (mut db, admin) = seeded();
        let denver_admin = add_user(&mut db, &admin, "Dora", "sector_admin:denver", 0.0);
        let err = db
            .create_patient(
                &denver_admin,
                NewPatient {
                    name: "Lucas".to_string(),
                    sector: Sector::Aba,
                    weekly_hours: 10.0,
                    hourly_rate: 60.0,
                    assigned_staff_id: None,
                    guardians: Vec::new(),
                },
            )
            .unwrap_err();
        assert!(matches!(err, DbError::Forbidden(_)));

        let patient = add_patient(&mut db, &admin, "Lucas", None, &[]);
        let staff = add_user(&mut db, &admin, "Rita", "staff:aba", 40.0);
        assert!(matches!(
            db.delete_patient(&staff, &patient.id),
            Err(DbError::Forbidden(_))
        ));
        assert!(matches!(
            db.delete_patient(&denver_admin, &patient.id),
            Err(DbError::Forbidden(_))
        ));
    }

    #[test]
    fn deleting_one_of_two_patients_keeps_shared_guardian() {
        let (mut db, admin) = seeded();
        let staff = add_user(&mut db, &admin, "Rita", "staff:aba", 40.0);
        let p = add_patient(&mut db, &admin, "Pedro", None, &[("family@mail.com", Some("Fam"))]);
        let q = add_patient(
            &mut db,
            &admin,
            "Quin",
            None,
            &[("other@mail.com", Some("Other")), ("family@mail.com", None)],
        );
        db.conn
            .execute(
                "
                INSERT INTO attendances (id, patient_id, staff_id, submitted_by, date, start_time, end_time, hours, created_at)
                VALUES ('a1', ?1, ?2, ?2, '2025-04-01', '08:00', '09:00', 1.0, '2025-04-01T00:00:00.000Z'),
                       ('a2', ?1, ?2, ?2, '2025-04-02', '08:00', '09:00', 1.0, '2025-04-01T00:00:00.000Z'),
                       ('a3', ?3, ?2, ?2, '2025-04-02', '08:00', '09:00', 1.0, '2025-04-01T00:00:00.000Z')
                ",
                params![p.id.as_str(), staff.id.as_str(), q.id.as_str()],
            )
            .unwrap();

        let outcome = db.delete_patient(&admin, &p.id).unwrap();
        assert_eq!(outcome.attendances_deleted, 2);
        assert!(outcome.guardians_deleted.is_empty());
        assert_eq!(outcome.guardians_retained.len(), 1);
        assert!(
            db.find_user_by_email(&Email::parse("family@mail.com").unwrap())
                .unwrap()
                .is_some()
        );
        assert_eq!(count(&db, "SELECT COUNT(*) FROM attendances"), 1);
        assert!(matches!(
            db.get_patient(&p.id),
            Err(DbError::NotFound { .. })
        ));

        let outcome = db.delete_patient(&admin, &q.id).unwrap();
        assert_eq!(outcome.guardians_deleted.len(), 2);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users WHERE role = 'guardian'"), 0);
        assert_eq!(count(&db, "SELECT COUNT(*) FROM attendances"), 0);
    }

    #[test]
    fn failed_guardian_removal_does_not_block_patient_deletion() {
        let (mut db, admin) = seeded();
        let patient = add_patient(
            &mut db,
            &admin,
            "Pedro",
            None,
            &[("locked@mail.com", Some("Lock")), ("free@mail.com", Some("Free"))],
        );
        db.conn
            .execute_batch(
                "
                CREATE TRIGGER keep_locked_guardian BEFORE DELETE ON users
                WHEN OLD.email = 'locked@mail.com'
                BEGIN
                    SELECT RAISE(ABORT, 'guardian is locked');
                END;
                ",
            )
            .unwrap();

        let outcome = db.delete_patient(&admin, &patient.id).unwrap();
        assert_eq!(
            outcome.guardians_failed,
            vec![Email::parse("locked@mail.com").unwrap()]
        );
        assert_eq!(
            outcome.guardians_deleted,
            vec![Email::parse("free@mail.com").unwrap()]
        );
        assert!(outcome.guardians_retained.is_empty());
        assert!(matches!(
            db.get_patient(&patient.id),
            Err(DbError::NotFound { .. })
        ));
        assert_eq!(count(&db, "SELECT COUNT(*) FROM users WHERE role = 'guardian'"), 1);
        assert!(
            db.find_user_by_email(&Email::parse("locked@mail.com").unwrap())
                .unwrap()
                .is_some()
        );
    }

    #[test]
    fn deleting_unknown_patient_is_not_found() {
        let (mut db, admin) = seeded();
        let err = db
            .delete_patient(&admin, &PatientId::new("nope").unwrap())
            .unwrap_err();
        assert!(matches!(err, DbError::NotFound { entity: "patient", .. }));
    }

    #[test]
    fn guardians_only_see_their_own_patients() {
        let (mut db, admin) = seeded();
        add_patient(&mut db, &admin, "Pedro", None, &[("family@mail.com", Some("Fam"))]);
        add_patient(&mut db, &admin, "Quin", None, &[("other@mail.com", Some("Other"))]);
        let guardian = db
            .find_user_by_email(&Email::parse("family@mail.com").unwrap())
            .unwrap()
            .unwrap()
            .identity();
        let visible = db.list_patients(&guardian).unwrap();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "Pedro");
        assert_eq!(db.list_patients(&admin).unwrap().len(), 2);
    }
}
