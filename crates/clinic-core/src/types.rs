//! Core type definitions with validation.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Loose shape check; deliverability is not our concern.
static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A wall-clock time that is not `HH:MM`.
    #[error("invalid time {value:?}, expected HH:MM")]
    InvalidClock { value: String },

    /// Start and end resolve to a zero-length interval.
    #[error("end time must be after start time")]
    NonPositiveDuration,

    /// A month outside 1..=12 or an unrepresentable year.
    #[error("invalid period {month}/{year}")]
    InvalidPeriod { month: u32, year: i32 },

    #[error("invalid email address: {value}")]
    InvalidEmail { value: String },

    #[error("unknown sector: {value}")]
    UnknownSector { value: String },

    #[error("unknown role: {value}")]
    UnknownRole { value: String },

    /// Staff and sector admins need a sector; everyone else must not carry one.
    #[error("role {role} {}", sector_rule(.requires_sector))]
    SectorMismatch { role: String, requires_sector: bool },

    /// Rates, weekly hours and similar quantities.
    #[error("{field} must be a non-negative number, got {value}")]
    NegativeAmount { field: &'static str, value: f64 },

    /// A newly provisioned guardian needs a display name.
    #[error("guardian name is required to register {email}")]
    MissingGuardianName { email: String },

    /// Only caregivers are paid for sessions; someone else filing one needs
    /// the patient to have an assigned caregiver.
    #[error("role {role} cannot file a session for a patient with no assigned staff")]
    NoCreditedStaff { role: String },

    #[error("a patient has at most two guardians, got {count}")]
    TooManyGuardians { count: usize },

    #[error("guardian email {email} listed twice")]
    DuplicateGuardian { email: String },
}

const fn sector_rule(requires_sector: &bool) -> &'static str {
    if *requires_sector {
        "requires a sector"
    } else {
        "must not have a sector"
    }
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.trim().is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Creates a fresh random ID.
            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Self::new(s)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Identifier of any user row (guardian, staff, admin, billing).
    UserId, "user ID"
);

define_string_id!(
    /// Identifier of a patient.
    PatientId, "patient ID"
);

define_string_id!(
    /// Identifier of an attendance (billable session).
    AttendanceId, "attendance ID"
);

define_string_id!(
    /// Identifier of a supervision record.
    SupervisionId, "supervision ID"
);

/// A program track partitioning patients, staff and rate tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sector {
    Aba,
    Denver,
    Grupo,
    Escolar,
}

impl Sector {
    pub const ALL: [Self; 4] = [Self::Aba, Self::Denver, Self::Grupo, Self::Escolar];

    /// String representation for database storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Aba => "aba",
            Self::Denver => "denver",
            Self::Grupo => "grupo",
            Self::Escolar => "escolar",
        }
    }
}

impl fmt::Display for Sector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Sector {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "aba" => Ok(Self::Aba),
            "denver" => Ok(Self::Denver),
            "grupo" => Ok(Self::Grupo),
            "escolar" => Ok(Self::Escolar),
            _ => Err(ValidationError::UnknownSector {
                value: s.to_string(),
            }),
        }
    }
}

/// A normalized (trimmed, lowercased) email address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let normalized = raw.trim().to_lowercase();
        if normalized.is_empty() {
            return Err(ValidationError::Empty { field: "email" });
        }
        if !EMAIL_RE.is_match(&normalized) {
            return Err(ValidationError::InvalidEmail {
                value: raw.to_string(),
            });
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Email {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Email {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Email> for String {
    fn from(email: Email) -> Self {
        email.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Rejects NaN and negative quantities.
pub fn non_negative(field: &'static str, value: f64) -> Result<f64, ValidationError> {
    if value.is_nan() || value < 0.0 {
        return Err(ValidationError::NegativeAmount { field, value });
    }
    Ok(value)
}

/// Trims a required text field, rejecting blanks.
pub fn required_text(field: &'static str, value: &str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty { field });
    }
    Ok(trimmed.to_string())
}
