//! Storage layer for clinic attendance and billing.
//!
//! Provides persistence for users, patients, attendances, supervisions and the
//! supervision rate table using `rusqlite`, and the verb-oriented operations
//! that mutate them.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Handle one request per `Database` at a time, or wrap it in a `Mutex`.
//!
//! # Atomicity
//!
//! Every composite operation (patient creation with guardian provisioning,
//! patient deletion, attendance transitions, rate table saves) runs inside a
//! single SQLite transaction. Attendance rows and the rate table carry a
//! `version` column; updates are compare-and-swap on that version and a lost
//! race surfaces as [`DbError::Conflict`].
//!
//! # Schema
//!
//! Timestamps are stored as TEXT in RFC 3339 (`2025-01-15T10:30:00.000Z`),
//! calendar dates as `YYYY-MM-DD` and wall-clock times as `HH:MM`, so
//! lexicographic order matches chronological order.

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use clinic_core::{TransitionError, ValidationError};
use rusqlite::Connection;
use thiserror::Error;

mod attendance;
mod credential;
mod patients;
mod reports;
mod supervision;
mod users;

pub use attendance::AttendanceFilter;
pub use credential::verify_credential;
pub use patients::PatientDeletion;
pub use supervision::SupervisionFilter;

/// Credential given to auto-provisioned guardians until they change it.
pub const DEFAULT_GUARDIAN_CREDENTIAL: &str = "changeme";

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// The acting identity may not perform this operation.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Rejected input.
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    /// Rejected lifecycle move.
    #[error(transparent)]
    Transition(#[from] TransitionError),
    /// The write lost a race or collides with existing data.
    #[error("conflict: {0}")]
    Conflict(String),
    /// Hashing a credential failed.
    #[error("credential error: {0}")]
    Credential(String),
    /// A stored value could not be decoded.
    #[error("invalid stored {column} for {id}: {message}")]
    Corrupt {
        column: &'static str,
        id: String,
        message: String,
    },
    /// The rate table payload is not valid JSON.
    #[error("invalid rate table payload: {0}")]
    RatePayload(#[from] serde_json::Error),
}

/// Coarse error classes exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidInput,
    Conflict,
    Internal,
}

impl ErrorKind {
    /// The HTTP status a request handler should answer with.
    pub const fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Forbidden => 403,
            Self::InvalidInput => 400,
            Self::Conflict => 409,
            Self::Internal => 500,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotFound => "not found",
            Self::Forbidden => "forbidden",
            Self::InvalidInput => "invalid input",
            Self::Conflict => "conflict",
            Self::Internal => "internal error",
        };
        write!(f, "{s}")
    }
}

impl DbError {
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Forbidden(_) | Self::Transition(TransitionError::Forbidden { .. }) => {
                ErrorKind::Forbidden
            }
            Self::Invalid(_) => ErrorKind::InvalidInput,
            Self::Conflict(_) | Self::Transition(_) => ErrorKind::Conflict,
            Self::Sqlite(_) | Self::Credential(_) | Self::Corrupt { .. } | Self::RatePayload(_) => {
                ErrorKind::Internal
            }
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                email TEXT NOT NULL UNIQUE,
                role TEXT NOT NULL,
                sector TEXT,
                hourly_rate REAL NOT NULL DEFAULT 0,
                active INTEGER NOT NULL DEFAULT 1,
                credential_hash TEXT NOT NULL,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_users_role ON users(role);

            -- guardian_email/guardian_email_2 reference users.email by value
            CREATE TABLE IF NOT EXISTS patients (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                sector TEXT NOT NULL,
                weekly_hours REAL NOT NULL DEFAULT 0,
                hourly_rate REAL NOT NULL DEFAULT 0,
                assigned_staff_id TEXT,
                parent_id TEXT,
                guardian_email TEXT,
                guardian_email_2 TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (assigned_staff_id) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (parent_id) REFERENCES users(id) ON DELETE SET NULL
            );

            CREATE INDEX IF NOT EXISTS idx_patients_sector ON patients(sector);
            CREATE INDEX IF NOT EXISTS idx_patients_guardian_email ON patients(guardian_email);
            CREATE INDEX IF NOT EXISTS idx_patients_guardian_email_2 ON patients(guardian_email_2);

            -- date: 'YYYY-MM-DD'; start_time/end_time: 'HH:MM'
            -- hours: frozen at creation, never recomputed
            CREATE TABLE IF NOT EXISTS attendances (
                id TEXT PRIMARY KEY,
                patient_id TEXT NOT NULL,
                staff_id TEXT NOT NULL,
                submitted_by TEXT NOT NULL,
                date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                hours REAL NOT NULL,
                observations TEXT,
                is_substitution INTEGER NOT NULL DEFAULT 0,
                confirmed INTEGER NOT NULL DEFAULT 0,
                confirmed_at TEXT,
                confirmed_by TEXT,
                approved INTEGER NOT NULL DEFAULT 0,
                approved_at TEXT,
                approved_by TEXT,
                launched INTEGER NOT NULL DEFAULT 0,
                launched_at TEXT,
                launched_by TEXT,
                version INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL,
                FOREIGN KEY (patient_id) REFERENCES patients(id) ON DELETE CASCADE,
                FOREIGN KEY (staff_id) REFERENCES users(id)
            );

            CREATE INDEX IF NOT EXISTS idx_attendances_patient ON attendances(patient_id);
            CREATE INDEX IF NOT EXISTS idx_attendances_staff ON attendances(staff_id);
            CREATE INDEX IF NOT EXISTS idx_attendances_date ON attendances(date);

            CREATE TABLE IF NOT EXISTS supervisions (
                id TEXT PRIMARY KEY,
                staff_id TEXT NOT NULL,
                coordinator_id TEXT NOT NULL,
                date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                hours REAL NOT NULL,
                sector TEXT NOT NULL,
                observations TEXT,
                created_at TEXT NOT NULL,
                FOREIGN KEY (staff_id) REFERENCES users(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_supervisions_staff ON supervisions(staff_id);
            CREATE INDEX IF NOT EXISTS idx_supervisions_date ON supervisions(date);

            -- Single row; rates is a JSON object of sector -> hourly rate
            CREATE TABLE IF NOT EXISTS supervision_rates (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                rates TEXT NOT NULL,
                version INTEGER NOT NULL,
                updated_at TEXT NOT NULL,
                updated_by TEXT NOT NULL
            );
            ",
        )?;
        Ok(())
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn parse_timestamp(value: &str, column: &'static str, id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(value)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|err| corrupt(column, id, err))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_date(value: &str, column: &'static str, id: &str) -> Result<NaiveDate, DbError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| corrupt(column, id, err))
}

/// Parses a stored column through its `FromStr` impl.
fn parse_column<T>(value: &str, column: &'static str, id: &str) -> Result<T, DbError>
where
    T: FromStr,
    T::Err: fmt::Display,
{
    value.parse().map_err(|err| corrupt(column, id, err))
}

fn corrupt(column: &'static str, id: &str, err: impl fmt::Display) -> DbError {
    DbError::Corrupt {
        column,
        id: id.to_string(),
        message: err.to_string(),
    }
}
