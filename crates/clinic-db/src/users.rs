//! User registry and identity resolution.

use chrono::{DateTime, Utc};
use clinic_core::{Email, Identity, NewUser, Role, RoleTag, Sector, User, UserId};
use rusqlite::{Connection, OptionalExtension, params};

use crate::credential::hash_credential;
use crate::{Database, DbError, format_timestamp, parse_column, parse_timestamp};

const USER_COLUMNS: &str = "id, name, email, role, sector, hourly_rate, active, created_at";

#[derive(Debug)]
struct UserRow {
    id: String,
    name: String,
    email: String,
    role: String,
    sector: Option<String>,
    hourly_rate: f64,
    active: bool,
    created_at: String,
}

impl UserRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            email: row.get(2)?,
            role: row.get(3)?,
            sector: row.get(4)?,
            hourly_rate: row.get(5)?,
            active: row.get(6)?,
            created_at: row.get(7)?,
        })
    }

    fn into_user(self) -> Result<User, DbError> {
        let role: Role = parse_column(&self.role, "users.role", &self.id)?;
        let sector = self
            .sector
            .as_deref()
            .map(|sector| parse_column::<Sector>(sector, "users.sector", &self.id))
            .transpose()?;
        Ok(User {
            email: parse_column(&self.email, "users.email", &self.id)?,
            created_at: parse_timestamp(&self.created_at, "users.created_at", &self.id)?,
            id: parse_column(&self.id, "users.id", &self.id)?,
            name: self.name,
            role,
            sector,
            hourly_rate: self.hourly_rate,
            active: self.active,
        })
    }
}

impl Database {
    /// Creates the first general admin. Only allowed on an empty user table.
    pub fn bootstrap_admin(
        &mut self,
        name: &str,
        email: &str,
        credential: &str,
    ) -> Result<User, DbError> {
        let draft = NewUser {
            name: name.to_string(),
            email: email.to_string(),
            tag: RoleTag::new(Role::GeneralAdmin, None)?,
            hourly_rate: 0.0,
        };
        let tx = self.conn.transaction()?;
        let existing: i64 = tx.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?;
        if existing > 0 {
            return Err(DbError::Conflict(
                "users already exist; bootstrap is only allowed on an empty database".to_string(),
            ));
        }
        let user = insert_user(&tx, &draft, credential, Utc::now())?;
        tx.commit()?;
        tracing::info!(user_id = %user.id, "bootstrapped general admin");
        Ok(user)
    }

    /// Registers a user. General admins only.
    pub fn create_user(
        &mut self,
        actor: &Identity,
        draft: NewUser,
        credential: &str,
    ) -> Result<User, DbError> {
        if actor.role != Role::GeneralAdmin {
            return Err(DbError::Forbidden(format!(
                "role {} may not register users",
                actor.role
            )));
        }
        let tx = self.conn.transaction()?;
        let user = insert_user(&tx, &draft, credential, Utc::now())?;
        tx.commit()?;
        tracing::info!(user_id = %user.id, role = %user.role, "created user");
        Ok(user)
    }

    pub fn get_user(&self, id: &UserId) -> Result<User, DbError> {
        find_user(&self.conn, id)?.ok_or_else(|| DbError::not_found("user", id))
    }

    /// Resolves the acting identity for a request.
    pub fn identity_for(&self, id: &UserId) -> Result<Identity, DbError> {
        let user = self.get_user(id)?;
        if !user.active {
            return Err(DbError::Forbidden(format!("user {id} is inactive")));
        }
        Ok(user.identity())
    }

    pub fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, DbError> {
        find_user_by_email(&self.conn, email)
    }

    /// Lists users of `role`, ordered by name.
    pub fn list_users(&self, role: Option<Role>) -> Result<Vec<User>, DbError> {
        let mut stmt = self.conn.prepare(&format!(
            "
            SELECT {USER_COLUMNS}
            FROM users
            WHERE (?1 IS NULL OR role = ?1)
            ORDER BY name ASC, id ASC
            "
        ))?;
        let rows = stmt.query_map([role.map(|role| role.as_str())], UserRow::from_row)?;
        let mut users = Vec::new();
        for row in rows {
            users.push(row?.into_user()?);
        }
        Ok(users)
    }
}

fn insert_user(
    conn: &Connection,
    draft: &NewUser,
    credential: &str,
    now: DateTime<Utc>,
) -> Result<User, DbError> {
    let (name, email, hourly_rate) = draft.validate()?;
    if draft.tag.role == Role::Guardian {
        return Err(DbError::Forbidden(
            "guardians are provisioned through patient registration".to_string(),
        ));
    }
    if find_user_by_email(conn, &email)?.is_some() {
        return Err(DbError::Conflict(format!("email already registered: {email}")));
    }
    let user = User {
        id: UserId::generate(),
        name,
        email,
        role: draft.tag.role,
        sector: draft.tag.sector,
        hourly_rate,
        active: true,
        created_at: now,
    };
    store_user(conn, &user, &hash_credential(credential)?)?;
    Ok(user)
}

pub(crate) fn store_user(
    conn: &Connection,
    user: &User,
    credential_hash: &str,
) -> Result<(), DbError> {
    conn.execute(
        "
        INSERT INTO users (id, name, email, role, sector, hourly_rate, active, credential_hash, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            user.id.as_str(),
            user.name,
            user.email.as_str(),
            user.role.as_str(),
            user.sector.map(|sector| sector.as_str()),
            user.hourly_rate,
            user.active,
            credential_hash,
            format_timestamp(user.created_at),
        ],
    )?;
    Ok(())
}

pub(crate) fn find_user(conn: &Connection, id: &UserId) -> Result<Option<User>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"),
            [id.as_str()],
            UserRow::from_row,
        )
        .optional()?;
    row.map(UserRow::into_user).transpose()
}

pub(crate) fn find_user_by_email(
    conn: &Connection,
    email: &Email,
) -> Result<Option<User>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?"),
            [email.as_str()],
            UserRow::from_row,
        )
        .optional()?;
    row.map(UserRow::into_user).transpose()
}
