//! Patients, users and the guardian link between them.
//!
//! A patient references its guardians by email, not by id. The first guardian
//! is additionally linked by id (`parent_id`); the second only by email.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{Identity, Role, RoleTag};
use crate::types::{
    Email, PatientId, Sector, UserId, ValidationError, non_negative, required_text,
};

/// A person registered with the clinic in any role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: Email,
    pub role: Role,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sector: Option<Sector>,
    /// Pay rate per session hour; meaningful for staff only.
    pub hourly_rate: f64,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn identity(&self) -> Identity {
        Identity {
            id: self.id.clone(),
            role: self.role,
            sector: self.sector,
        }
    }

    pub const fn is_staff(&self) -> bool {
        matches!(self.role, Role::Staff)
    }
}

/// Fields for registering a non-guardian user.
#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub tag: RoleTag,
    pub hourly_rate: f64,
}

impl NewUser {
    pub fn validate(&self) -> Result<(String, Email, f64), ValidationError> {
        Ok((
            required_text("name", &self.name)?,
            Email::parse(&self.email)?,
            non_negative("hourly rate", self.hourly_rate)?,
        ))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub id: PatientId,
    pub name: String,
    pub sector: Sector,
    /// Target weekly capacity.
    pub weekly_hours: f64,
    /// Rate charged to guardians per session hour.
    pub hourly_rate: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_staff_id: Option<UserId>,
    /// Id of the first guardian.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_email: Option<Email>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardian_email_2: Option<Email>,
    pub created_at: DateTime<Utc>,
}

impl Patient {
    /// Guardian emails in slot order.
    pub fn guardian_emails(&self) -> impl Iterator<Item = &Email> {
        self.guardian_email
            .iter()
            .chain(self.guardian_email_2.iter())
    }
}

/// A guardian as supplied on patient creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianInput {
    pub email: String,
    /// Needed only when no guardian with this email exists yet.
    pub name: Option<String>,
}

/// A guardian after normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardianRef {
    pub email: Email,
    pub name: Option<String>,
}

impl GuardianRef {
    /// The display name for auto-provisioning this guardian.
    pub fn name_for_provisioning(&self) -> Result<String, ValidationError> {
        self.name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .ok_or_else(|| ValidationError::MissingGuardianName {
                email: self.email.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewPatient {
    pub name: String,
    pub sector: Sector,
    pub weekly_hours: f64,
    pub hourly_rate: f64,
    pub assigned_staff_id: Option<UserId>,
    pub guardians: Vec<GuardianInput>,
}

/// A [`NewPatient`] whose scalar fields and guardian list have been checked.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedPatient {
    pub name: String,
    pub sector: Sector,
    pub weekly_hours: f64,
    pub hourly_rate: f64,
    pub assigned_staff_id: Option<UserId>,
    pub guardians: Vec<GuardianRef>,
}

impl NewPatient {
    pub fn validate(self) -> Result<ValidatedPatient, ValidationError> {
        if self.guardians.len() > 2 {
            return Err(ValidationError::TooManyGuardians {
                count: self.guardians.len(),
            });
        }
        let mut guardians: Vec<GuardianRef> = Vec::with_capacity(self.guardians.len());
        for input in self.guardians {
            let email = Email::parse(&input.email)?;
            if guardians.iter().any(|existing| existing.email == email) {
                return Err(ValidationError::DuplicateGuardian {
                    email: email.to_string(),
                });
            }
            guardians.push(GuardianRef {
                email,
                name: input.name,
            });
        }
        Ok(ValidatedPatient {
            name: required_text("patient name", &self.name)?,
            sector: self.sector,
            weekly_hours: non_negative("weekly hours", self.weekly_hours)?,
            hourly_rate: non_negative("hourly rate", self.hourly_rate)?,
            assigned_staff_id: self.assigned_staff_id,
            guardians,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(guardians: Vec<GuardianInput>) -> NewPatient {
        NewPatient {
            name: " Lucas ".to_string(),
            sector: Sector::Aba,
            weekly_hours: 10.0,
            hourly_rate: 60.0,
            assigned_staff_id: None,
            guardians,
        }
    }

    fn guardian(email: &str, name: Option<&str>) -> GuardianInput {
        GuardianInput {
            email: email.to_string(),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn validate_normalizes_guardian_emails() {
        let patient = draft(vec![
            guardian(" Ana@Mail.com", Some("Ana")),
            guardian("bruno@mail.com", None),
        ])
        .validate()
        .unwrap();
        assert_eq!(patient.name, "Lucas");
        assert_eq!(patient.guardians[0].email.as_str(), "ana@mail.com");
        assert_eq!(patient.guardians[1].name, None);
    }

    #[test]
    fn validate_rejects_duplicates_and_excess() {
        let err = draft(vec![
            guardian("ana@mail.com", Some("Ana")),
            guardian("ANA@mail.com", Some("Ana")),
        ])
        .validate()
        .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateGuardian { .. }));

        let err = draft(vec![
            guardian("a@mail.com", None),
            guardian("b@mail.com", None),
            guardian("c@mail.com", None),
        ])
        .validate()
        .unwrap_err();
        assert_eq!(err, ValidationError::TooManyGuardians { count: 3 });
    }

    #[test]
    fn provisioning_requires_a_name() {
        let missing = GuardianRef {
            email: Email::parse("x@mail.com").unwrap(),
            name: Some("   ".to_string()),
        };
        assert!(matches!(
            missing.name_for_provisioning(),
            Err(ValidationError::MissingGuardianName { .. })
        ));
    }

    #[test]
    fn user_serializes_role_and_sector() {
        let user = User {
            id: UserId::new("u1").unwrap(),
            name: "Carla".to_string(),
            email: Email::parse("carla@clinic.com").unwrap(),
            role: Role::Staff,
            sector: Some(Sector::Denver),
            hourly_rate: 45.0,
            active: true,
            created_at: DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
        };
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["role"], "staff");
        assert_eq!(value["sector"], "denver");
        let parsed: User = serde_json::from_value(value).unwrap();
        assert_eq!(parsed, user);
        assert_eq!(parsed.identity().sector, Some(Sector::Denver));
    }
}
