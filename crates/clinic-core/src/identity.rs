//! Roles and the per-request acting identity.
//!
//! Roles are decoded once, at the boundary, from a compound tag such as
//! `staff:aba` or `general_admin`. Everything downstream matches on [`Role`]
//! and [`Identity::sector`] and never inspects strings.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::types::{Sector, UserId, ValidationError};

/// The kind of user acting on the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Family member billed for a patient's sessions.
    Guardian,
    /// Caregiver, paid per session and supervision hour.
    Staff,
    /// Front desk. Attests that a visit happened.
    Reception,
    SectorAdmin,
    GeneralAdmin,
    /// Produces the amount-owed-by-guardians report.
    BillingGuardians,
    /// Produces the amount-owed-to-staff report and owns the rate table.
    BillingStaff,
}

impl Role {
    pub const ALL: [Self; 7] = [
        Self::Guardian,
        Self::Staff,
        Self::Reception,
        Self::SectorAdmin,
        Self::GeneralAdmin,
        Self::BillingGuardians,
        Self::BillingStaff,
    ];

    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Guardian => "guardian",
            Self::Staff => "staff",
            Self::Reception => "reception",
            Self::SectorAdmin => "sector_admin",
            Self::GeneralAdmin => "general_admin",
            Self::BillingGuardians => "billing_guardians",
            Self::BillingStaff => "billing_staff",
        }
    }

    /// Whether users of this role belong to exactly one sector.
    pub const fn requires_sector(self) -> bool {
        matches!(self, Self::Staff | Self::SectorAdmin)
    }

    /// Front desk and management may attest that a visit happened, or reject it.
    pub const fn can_confirm(self) -> bool {
        matches!(self, Self::Reception | Self::SectorAdmin | Self::GeneralAdmin)
    }

    /// Only management approves and launches.
    pub const fn can_approve(self) -> bool {
        matches!(self, Self::SectorAdmin | Self::GeneralAdmin)
    }

    pub const fn can_submit_attendance(self) -> bool {
        matches!(
            self,
            Self::Staff | Self::Reception | Self::SectorAdmin | Self::GeneralAdmin
        )
    }

    pub const fn can_manage_patients(self) -> bool {
        matches!(self, Self::Reception | Self::SectorAdmin | Self::GeneralAdmin)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownRole {
                value: s.to_string(),
            })
    }
}

/// A role together with its sector, validated as a pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RoleTag {
    pub role: Role,
    pub sector: Option<Sector>,
}

impl RoleTag {
    pub fn new(role: Role, sector: Option<Sector>) -> Result<Self, ValidationError> {
        if role.requires_sector() != sector.is_some() {
            return Err(ValidationError::SectorMismatch {
                role: role.to_string(),
                requires_sector: role.requires_sector(),
            });
        }
        Ok(Self { role, sector })
    }
}

impl fmt::Display for RoleTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.sector {
            Some(sector) => write!(f, "{}:{sector}", self.role),
            None => write!(f, "{}", self.role),
        }
    }
}

/// Parses `role` or `role:sector`.
impl FromStr for RoleTag {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase();
        let (role, sector) = match s.split_once(':') {
            Some((role, sector)) => (role.parse::<Role>()?, Some(sector.parse::<Sector>()?)),
            None => (s.parse::<Role>()?, None),
        };
        Self::new(role, sector)
    }
}

/// Who is performing the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: UserId,
    pub role: Role,
    pub sector: Option<Sector>,
}

impl Identity {
    pub fn new(id: UserId, tag: RoleTag) -> Self {
        Self {
            id,
            role: tag.role,
            sector: tag.sector,
        }
    }

    /// Whether this identity may act on records of `sector`.
    ///
    /// Sector admins are confined to their own sector; other roles are not
    /// sector-scoped.
    pub fn covers(&self, sector: Sector) -> bool {
        match self.role {
            Role::SectorAdmin => self.sector == Some(sector),
            _ => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_tag_decodes_compound_strings() {
        let tag: RoleTag = "staff:aba".parse().unwrap();
        assert_eq!(tag.role, Role::Staff);
        assert_eq!(tag.sector, Some(Sector::Aba));

        let tag: RoleTag = "General_Admin".parse().unwrap();
        assert_eq!(tag.role, Role::GeneralAdmin);
        assert_eq!(tag.sector, None);
    }

    #[test]
    fn role_tag_enforces_sector_rules() {
        assert!(matches!(
            "staff".parse::<RoleTag>(),
            Err(ValidationError::SectorMismatch {
                requires_sector: true,
                ..
            })
        ));
        assert!(matches!(
            "guardian:aba".parse::<RoleTag>(),
            Err(ValidationError::SectorMismatch {
                requires_sector: false,
                ..
            })
        ));
        assert!(matches!(
            "janitor".parse::<RoleTag>(),
            Err(ValidationError::UnknownRole { .. })
        ));
    }

    #[test]
    fn role_tag_display_roundtrips() {
        for raw in ["sector_admin:denver", "billing_staff", "staff:escolar"] {
            assert_eq!(raw.parse::<RoleTag>().unwrap().to_string(), raw);
        }
    }

    #[test]
    fn permission_matrix() {
        assert!(Role::Reception.can_confirm());
        assert!(!Role::Reception.can_approve());
        assert!(Role::SectorAdmin.can_approve());
        assert!(!Role::Staff.can_confirm());
        assert!(!Role::BillingGuardians.can_submit_attendance());
        assert!(!Role::Guardian.can_manage_patients());
    }

    #[test]
    fn sector_admin_is_confined_to_own_sector() {
        let admin = Identity::new(
            UserId::new("u1").unwrap(),
            RoleTag::new(Role::SectorAdmin, Some(Sector::Denver)).unwrap(),
        );
        assert!(admin.covers(Sector::Denver));
        assert!(!admin.covers(Sector::Aba));

        let general = Identity::new(
            UserId::new("u2").unwrap(),
            RoleTag::new(Role::GeneralAdmin, None).unwrap(),
        );
        assert!(general.covers(Sector::Aba));
    }
}
