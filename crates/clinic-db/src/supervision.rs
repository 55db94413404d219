//! Supervision records and the singleton supervision rate row.

use chrono::{DateTime, NaiveDate, Utc};
use clinic_core::{
    Identity, NewSupervision, RateTable, Role, Sector, Supervision, SupervisionId,
    SupervisionRates, UserId,
};
use rusqlite::{Connection, OptionalExtension, params};

use crate::users::find_user;
use crate::{
    Database, DbError, format_date, format_timestamp, parse_column, parse_date, parse_timestamp,
};

const SUPERVISION_COLUMNS: &str =
    "id, staff_id, coordinator_id, date, start_time, end_time, hours, sector, observations, created_at";

/// Criteria for [`Database::list_supervisions`]. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SupervisionFilter {
    pub staff_id: Option<UserId>,
    pub sector: Option<Sector>,
    /// Inclusive.
    pub from: Option<NaiveDate>,
    /// Exclusive.
    pub until: Option<NaiveDate>,
}

#[derive(Debug)]
struct SupervisionRow {
    id: String,
    staff_id: String,
    coordinator_id: String,
    date: String,
    start_time: String,
    end_time: String,
    hours: f64,
    sector: String,
    observations: Option<String>,
    created_at: String,
}

impl SupervisionRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            staff_id: row.get(1)?,
            coordinator_id: row.get(2)?,
            date: row.get(3)?,
            start_time: row.get(4)?,
            end_time: row.get(5)?,
            hours: row.get(6)?,
            sector: row.get(7)?,
            observations: row.get(8)?,
            created_at: row.get(9)?,
        })
    }

    fn into_supervision(self) -> Result<Supervision, DbError> {
        let id = self.id.as_str();
        Ok(Supervision {
            id: parse_column(id, "supervisions.id", id)?,
            staff_id: parse_column(&self.staff_id, "supervisions.staff_id", id)?,
            coordinator_id: parse_column(&self.coordinator_id, "supervisions.coordinator_id", id)?,
            date: parse_date(&self.date, "supervisions.date", id)?,
            start_time: parse_column(&self.start_time, "supervisions.start_time", id)?,
            end_time: parse_column(&self.end_time, "supervisions.end_time", id)?,
            hours: self.hours,
            sector: parse_column(&self.sector, "supervisions.sector", id)?,
            observations: self.observations,
            created_at: parse_timestamp(&self.created_at, "supervisions.created_at", id)?,
        })
    }
}

impl Database {
    /// Records supervision hours for a staff member.
    ///
    /// Staff may only report their own hours. Sector and general admins may
    /// record on behalf of any staff member they cover.
    pub fn create_supervision(
        &mut self,
        actor: &Identity,
        draft: NewSupervision,
    ) -> Result<Supervision, DbError> {
        self.create_supervision_at(actor, draft, Utc::now())
    }

    pub fn create_supervision_at(
        &mut self,
        actor: &Identity,
        draft: NewSupervision,
        now: DateTime<Utc>,
    ) -> Result<Supervision, DbError> {
        match actor.role {
            Role::Staff if actor.id == draft.staff_id => {}
            Role::Staff => {
                return Err(DbError::Forbidden(
                    "staff may only report their own supervision hours".to_string(),
                ));
            }
            Role::SectorAdmin | Role::GeneralAdmin => {}
            role => {
                return Err(DbError::Forbidden(format!(
                    "role {role} may not record supervision"
                )));
            }
        }

        let tx = self.conn.transaction()?;
        let staff = find_user(&tx, &draft.staff_id)?
            .ok_or_else(|| DbError::not_found("user", &draft.staff_id))?;
        let sector = match (staff.is_staff(), staff.sector) {
            (true, Some(sector)) => sector,
            _ => {
                return Err(DbError::Conflict(format!(
                    "user {} is not a staff member with a sector",
                    staff.id
                )));
            }
        };
        if !actor.covers(sector) {
            return Err(DbError::Forbidden(format!(
                "staff member belongs to sector {sector}, outside the actor's sector"
            )));
        }

        let supervision = draft.into_supervision(&actor.id, sector, now)?;
        tx.execute(
            &format!(
                "INSERT INTO supervisions ({SUPERVISION_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
            ),
            params![
                supervision.id.as_str(),
                supervision.staff_id.as_str(),
                supervision.coordinator_id.as_str(),
                format_date(supervision.date),
                supervision.start_time.to_string(),
                supervision.end_time.to_string(),
                supervision.hours,
                supervision.sector.as_str(),
                supervision.observations,
                format_timestamp(supervision.created_at),
            ],
        )?;
        tx.commit()?;

        tracing::info!(
            supervision_id = %supervision.id,
            staff_id = %supervision.staff_id,
            hours = supervision.hours,
            "created supervision"
        );
        Ok(supervision)
    }

    pub fn delete_supervision(
        &mut self,
        actor: &Identity,
        id: &SupervisionId,
    ) -> Result<(), DbError> {
        if !matches!(actor.role, Role::SectorAdmin | Role::GeneralAdmin) {
            return Err(DbError::Forbidden(format!(
                "role {} may not delete supervision",
                actor.role
            )));
        }
        let tx = self.conn.transaction()?;
        let supervision =
            find_supervision(&tx, id)?.ok_or_else(|| DbError::not_found("supervision", id))?;
        if !actor.covers(supervision.sector) {
            return Err(DbError::Forbidden(format!(
                "supervision belongs to sector {}, outside the actor's sector",
                supervision.sector
            )));
        }
        tx.execute("DELETE FROM supervisions WHERE id = ?", [id.as_str()])?;
        tx.commit()?;
        tracing::info!(supervision_id = %id, actor = %actor.id, "deleted supervision");
        Ok(())
    }

    /// Lists supervisions matching `filter`, oldest first.
    pub fn list_supervisions(
        &self,
        filter: &SupervisionFilter,
    ) -> Result<Vec<Supervision>, DbError> {
        query_supervisions(&self.conn, filter)
    }

    /// The current rate table; an empty table at version 0 if never saved.
    pub fn supervision_rates(&self) -> Result<RateTable, DbError> {
        load_rates(&self.conn)
    }

    /// Replaces the rate table.
    ///
    /// With `expected_version` set, the save is rejected as a conflict when
    /// someone else saved in between.
    pub fn save_supervision_rates(
        &mut self,
        actor: &Identity,
        rates: SupervisionRates,
        expected_version: Option<i64>,
    ) -> Result<RateTable, DbError> {
        self.save_supervision_rates_at(actor, rates, expected_version, Utc::now())
    }

    pub fn save_supervision_rates_at(
        &mut self,
        actor: &Identity,
        rates: SupervisionRates,
        expected_version: Option<i64>,
        now: DateTime<Utc>,
    ) -> Result<RateTable, DbError> {
        if actor.role != Role::BillingStaff {
            return Err(DbError::Forbidden(format!(
                "role {} may not change supervision rates",
                actor.role
            )));
        }
        let tx = self.conn.transaction()?;
        let current = load_rates(&tx)?;
        if let Some(expected) = expected_version {
            if expected != current.version {
                return Err(DbError::Conflict(format!(
                    "supervision rates are at version {}, expected {expected}",
                    current.version
                )));
            }
        }

        let table = RateTable {
            rates,
            version: current.version + 1,
            updated_at: Some(now),
            updated_by: Some(actor.id.clone()),
        };
        let payload = serde_json::to_string(&table.rates)?;
        let updated = tx.execute(
            "
            INSERT INTO supervision_rates (id, rates, version, updated_at, updated_by)
            VALUES (1, ?1, ?2, ?3, ?4)
            ON CONFLICT(id) DO UPDATE SET
                rates = excluded.rates,
                version = excluded.version,
                updated_at = excluded.updated_at,
                updated_by = excluded.updated_by
            WHERE supervision_rates.version = ?5
            ",
            params![
                payload,
                table.version,
                format_timestamp(now),
                actor.id.as_str(),
                current.version,
            ],
        )?;
        if updated == 0 {
            return Err(DbError::Conflict(
                "supervision rates were modified concurrently".to_string(),
            ));
        }
        tx.commit()?;

        tracing::info!(version = table.version, actor = %actor.id, "saved supervision rates");
        Ok(table)
    }
}

fn find_supervision(conn: &Connection, id: &SupervisionId) -> Result<Option<Supervision>, DbError> {
    let row = conn
        .query_row(
            &format!("SELECT {SUPERVISION_COLUMNS} FROM supervisions WHERE id = ?"),
            [id.as_str()],
            SupervisionRow::from_row,
        )
        .optional()?;
    row.map(SupervisionRow::into_supervision).transpose()
}

pub(crate) fn query_supervisions(
    conn: &Connection,
    filter: &SupervisionFilter,
) -> Result<Vec<Supervision>, DbError> {
    let mut stmt = conn.prepare(&format!(
        "
        SELECT {SUPERVISION_COLUMNS}
        FROM supervisions
        WHERE (?1 IS NULL OR staff_id = ?1)
          AND (?2 IS NULL OR sector = ?2)
          AND (?3 IS NULL OR date >= ?3)
          AND (?4 IS NULL OR date < ?4)
        ORDER BY date ASC, start_time ASC, id ASC
        "
    ))?;
    let rows = stmt.query_map(
        params![
            filter.staff_id.as_ref().map(UserId::as_str),
            filter.sector.map(|sector| sector.as_str()),
            filter.from.map(format_date),
            filter.until.map(format_date),
        ],
        SupervisionRow::from_row,
    )?;
    let mut supervisions = Vec::new();
    for row in rows {
        supervisions.push(row?.into_supervision()?);
    }
    Ok(supervisions)
}

pub(crate) fn load_rates(conn: &Connection) -> Result<RateTable, DbError> {
    let row: Option<(String, i64, String, String)> = conn
        .query_row(
            "SELECT rates, version, updated_at, updated_by FROM supervision_rates WHERE id = 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )
        .optional()?;
    let Some((rates, version, updated_at, updated_by)) = row else {
        return Ok(RateTable::default());
    };
    Ok(RateTable {
        rates: serde_json::from_str(&rates)?,
        version,
        updated_at: Some(parse_timestamp(
            &updated_at,
            "supervision_rates.updated_at",
            "1",
        )?),
        updated_by: Some(parse_column(&updated_by, "supervision_rates.updated_by", "1")?),
    })
}
