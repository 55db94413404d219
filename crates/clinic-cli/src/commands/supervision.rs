//! Supervision command.

use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::NaiveDate;
use clap::{Args, Subcommand};
use clinic_core::{ClockTime, Identity, NewSupervision, ReportPeriod, SupervisionId, UserId};
use clinic_db::{Database, SupervisionFilter};

use super::util::{hours, write_json};

#[derive(Debug, Subcommand)]
pub enum SupervisionAction {
    /// Record supervision hours, rounded to the nearest half hour.
    Add(AddSupervisionArgs),
    /// List supervision records.
    List {
        #[arg(long)]
        staff: Option<UserId>,
        /// Restrict to a month; requires `--year`.
        #[arg(long, requires = "year")]
        month: Option<u32>,
        #[arg(long, requires = "month")]
        year: Option<i32>,
        #[arg(long)]
        json: bool,
    },
    /// Delete a supervision record.
    Delete { id: SupervisionId },
}

#[derive(Debug, Args)]
pub struct AddSupervisionArgs {
    /// Staff member supervised; defaults to the acting user.
    #[arg(long)]
    pub staff: Option<UserId>,
    #[arg(long)]
    pub date: NaiveDate,
    #[arg(long)]
    pub start: ClockTime,
    #[arg(long)]
    pub end: ClockTime,
    #[arg(long)]
    pub notes: Option<String>,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    action: &SupervisionAction,
) -> Result<()> {
    match action {
        SupervisionAction::Add(args) => {
            let supervision = db
                .create_supervision(
                    actor,
                    NewSupervision {
                        staff_id: args.staff.clone().unwrap_or_else(|| actor.id.clone()),
                        date: args.date,
                        start_time: args.start,
                        end_time: args.end,
                        observations: args.notes.clone(),
                    },
                )
                .context("failed to record supervision")?;
            writeln!(
                writer,
                "Recorded supervision {} ({} in {} for staff {})",
                supervision.id,
                hours(supervision.hours),
                supervision.sector,
                supervision.staff_id
            )?;
            Ok(())
        }
        SupervisionAction::List {
            staff,
            month,
            year,
            json,
        } => {
            let (from, until) = match (month, year) {
                (Some(month), Some(year)) => {
                    let (from, until) = ReportPeriod::new(*month, *year)?.bounds()?;
                    (Some(from), Some(until))
                }
                (None, None) => (None, None),
                _ => bail!("--month and --year must be given together"),
            };
            let supervisions = db.list_supervisions(&SupervisionFilter {
                staff_id: staff.clone(),
                sector: None,
                from,
                until,
            })?;
            if *json {
                return write_json(writer, &supervisions);
            }
            if supervisions.is_empty() {
                writeln!(writer, "No supervision recorded.")?;
            }
            for supervision in &supervisions {
                writeln!(
                    writer,
                    "{}  {} {}-{}  {}  {}  staff {}",
                    supervision.id,
                    supervision.date,
                    supervision.start_time,
                    supervision.end_time,
                    hours(supervision.hours),
                    supervision.sector,
                    supervision.staff_id
                )?;
            }
            Ok(())
        }
        SupervisionAction::Delete { id } => {
            db.delete_supervision(actor, id)
                .with_context(|| format!("failed to delete supervision {id}"))?;
            writeln!(writer, "Deleted supervision {id}")?;
            Ok(())
        }
    }
}
