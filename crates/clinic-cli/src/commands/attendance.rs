//! Attendance command: recording sessions and driving their lifecycle.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Args, Subcommand};
use clinic_core::{
    Attendance, AttendanceId, ClockTime, Identity, NewAttendance, PatientId, ReportPeriod, Sector,
    Transition, UserId,
};
use clinic_db::{AttendanceFilter, Database};

use super::util::{hours, write_json};

#[derive(Debug, Subcommand)]
pub enum AttendanceAction {
    /// Record a session.
    Add(AddAttendanceArgs),
    /// Front-desk confirmation that the session happened.
    Confirm(TransitionArgs),
    /// Sector approval of a confirmed session.
    Approve(TransitionArgs),
    /// Hand an approved session over to invoicing.
    Launch(TransitionArgs),
    /// Reject a session by deleting it.
    Delete { id: AttendanceId },
    /// Show one session.
    Show {
        id: AttendanceId,
        #[arg(long)]
        json: bool,
    },
    /// List sessions.
    List(ListAttendanceArgs),
    /// Sessions a staff member performed or is credited with in a month.
    History(HistoryArgs),
}

#[derive(Debug, Args)]
pub struct AddAttendanceArgs {
    #[arg(long)]
    pub patient: PatientId,
    /// Session date (`YYYY-MM-DD`).
    #[arg(long)]
    pub date: NaiveDate,
    /// Start time (`HH:MM`).
    #[arg(long)]
    pub start: ClockTime,
    /// End time (`HH:MM`); an end before the start crosses midnight.
    #[arg(long)]
    pub end: ClockTime,
    /// Covering for the patient's assigned caregiver.
    #[arg(long)]
    pub substitution: bool,
    #[arg(long)]
    pub notes: Option<String>,
}

#[derive(Debug, Args)]
pub struct TransitionArgs {
    pub id: AttendanceId,
    /// Fail unless the session is still at this version.
    #[arg(long)]
    pub expect_version: Option<i64>,
}

#[derive(Debug, Args)]
pub struct ListAttendanceArgs {
    #[arg(long)]
    pub patient: Option<PatientId>,
    /// Credited staff member.
    #[arg(long)]
    pub staff: Option<UserId>,
    #[arg(long)]
    pub sector: Option<Sector>,
    /// First date included.
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// First date excluded.
    #[arg(long)]
    pub until: Option<NaiveDate>,
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Defaults to the acting user.
    #[arg(long)]
    pub staff: Option<UserId>,
    #[arg(long)]
    pub month: u32,
    #[arg(long)]
    pub year: i32,
    #[arg(long)]
    pub json: bool,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    action: &AttendanceAction,
) -> Result<()> {
    match action {
        AttendanceAction::Add(args) => add(writer, db, actor, args),
        AttendanceAction::Confirm(args) => transition(writer, db, actor, Transition::Confirm, args),
        AttendanceAction::Approve(args) => transition(writer, db, actor, Transition::Approve, args),
        AttendanceAction::Launch(args) => transition(writer, db, actor, Transition::Launch, args),
        AttendanceAction::Delete { id } => {
            db.delete_attendance(actor, id)
                .with_context(|| format!("failed to delete attendance {id}"))?;
            writeln!(writer, "Deleted attendance {id}")?;
            Ok(())
        }
        AttendanceAction::Show { id, json } => {
            let attendance = db.get_attendance(actor, id)?;
            if *json {
                return write_json(writer, &attendance);
            }
            write_detail(writer, &attendance)
        }
        AttendanceAction::List(args) => {
            let filter = AttendanceFilter {
                patient_id: args.patient.clone(),
                staff_id: args.staff.clone(),
                sector: args.sector,
                from: args.from,
                until: args.until,
            };
            let attendances = db.list_attendances(actor, &filter)?;
            write_list(writer, &attendances, args.json)
        }
        AttendanceAction::History(args) => {
            let staff_id = args.staff.as_ref().unwrap_or(&actor.id);
            let period = ReportPeriod::new(args.month, args.year)?;
            let attendances = db.staff_history(actor, staff_id, period)?;
            write_list(writer, &attendances, args.json)
        }
    }
}

fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    args: &AddAttendanceArgs,
) -> Result<()> {
    let attendance = db
        .create_attendance(
            actor,
            NewAttendance {
                patient_id: args.patient.clone(),
                date: args.date,
                start_time: args.start,
                end_time: args.end,
                observations: args.notes.clone(),
                is_substitution: args.substitution,
            },
        )
        .context("failed to record attendance")?;
    writeln!(
        writer,
        "Recorded attendance {} ({} for staff {})",
        attendance.id,
        hours(attendance.hours),
        attendance.staff_id
    )?;
    Ok(())
}

fn transition<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    transition: Transition,
    args: &TransitionArgs,
) -> Result<()> {
    let attendance = db
        .transition_attendance_at(actor, &args.id, transition, args.expect_version, Utc::now())
        .with_context(|| format!("failed to {transition} attendance {}", args.id))?;
    writeln!(
        writer,
        "Attendance {} is now {} (version {})",
        attendance.id,
        attendance.stage(),
        attendance.version
    )?;
    Ok(())
}

fn write_list<W: Write>(writer: &mut W, attendances: &[Attendance], json: bool) -> Result<()> {
    if json {
        return write_json(writer, attendances);
    }
    if attendances.is_empty() {
        writeln!(writer, "No attendances.")?;
        return Ok(());
    }
    for attendance in attendances {
        writeln!(
            writer,
            "{}  {} {}-{}  {}  {}  patient {}  staff {}{}",
            attendance.id,
            attendance.date,
            attendance.start_time,
            attendance.end_time,
            hours(attendance.hours),
            attendance.stage(),
            attendance.patient_id,
            attendance.staff_id,
            if attendance.is_substitution {
                "  (substitution)"
            } else {
                ""
            }
        )?;
    }
    Ok(())
}

fn write_detail<W: Write>(writer: &mut W, attendance: &Attendance) -> Result<()> {
    writeln!(writer, "Attendance {}", attendance.id)?;
    writeln!(writer, "  patient: {}", attendance.patient_id)?;
    writeln!(writer, "  credited staff: {}", attendance.staff_id)?;
    if attendance.submitted_by != attendance.staff_id {
        writeln!(writer, "  submitted by: {}", attendance.submitted_by)?;
    }
    writeln!(
        writer,
        "  session: {} {}-{} ({})",
        attendance.date,
        attendance.start_time,
        attendance.end_time,
        hours(attendance.hours)
    )?;
    writeln!(writer, "  stage: {} (version {})", attendance.stage(), attendance.version)?;
    for (label, attestation) in [
        ("confirmed", &attendance.confirmed),
        ("approved", &attendance.approved),
        ("launched", &attendance.launched),
    ] {
        if let Some(attestation) = attestation {
            writeln!(
                writer,
                "  {label}: {} by {}",
                attestation.at.format("%Y-%m-%d %H:%M"),
                attestation.by
            )?;
        }
    }
    if let Some(notes) = &attendance.observations {
        writeln!(writer, "  notes: {notes}")?;
    }
    Ok(())
}
