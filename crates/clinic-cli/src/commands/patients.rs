//! Patients command: registration with guardian provisioning, and removal.

use std::io::Write;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use clinic_core::{Email, GuardianInput, Identity, NewPatient, Patient, PatientId, Sector, UserId};
use clinic_db::Database;

use super::util::{money, write_json};

#[derive(Debug, Subcommand)]
pub enum PatientsAction {
    /// Register a patient.
    Add(AddPatientArgs),
    /// List the patients visible to the acting user.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Show one patient.
    Show {
        id: PatientId,
        #[arg(long)]
        json: bool,
    },
    /// Delete a patient, its attendances and guardians no one else needs.
    Delete { id: PatientId },
}

#[derive(Debug, Args)]
pub struct AddPatientArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub sector: Sector,
    /// Target weekly hours.
    #[arg(long, default_value_t = 0.0)]
    pub weekly_hours: f64,
    /// Rate charged to guardians per session hour.
    #[arg(long)]
    pub rate: f64,
    /// Default caregiver.
    #[arg(long)]
    pub staff: Option<UserId>,
    /// Guardian as `email` or `email=Name`; the name is needed for a new
    /// guardian. At most two.
    #[arg(long = "guardian", value_parser = parse_guardian)]
    pub guardians: Vec<GuardianInput>,
}

fn parse_guardian(value: &str) -> Result<GuardianInput, String> {
    let (email, name) = match value.split_once('=') {
        Some((email, name)) => (email, Some(name.trim().to_string())),
        None => (value, None),
    };
    if email.trim().is_empty() {
        return Err("guardian email cannot be empty".to_string());
    }
    Ok(GuardianInput {
        email: email.trim().to_string(),
        name: name.filter(|name| !name.is_empty()),
    })
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    action: &PatientsAction,
) -> Result<()> {
    match action {
        PatientsAction::Add(args) => add(writer, db, actor, args),
        PatientsAction::List { json } => {
            let patients = db.list_patients(actor)?;
            if *json {
                return write_json(writer, &patients);
            }
            if patients.is_empty() {
                writeln!(writer, "No patients.")?;
            }
            for patient in &patients {
                write_summary(writer, patient)?;
            }
            Ok(())
        }
        PatientsAction::Show { id, json } => {
            let patient = db.get_patient(id)?;
            if *json {
                return write_json(writer, &patient);
            }
            write_summary(writer, &patient)?;
            writeln!(writer, "  weekly hours: {}", patient.weekly_hours)?;
            if let Some(staff) = &patient.assigned_staff_id {
                writeln!(writer, "  assigned staff: {staff}")?;
            }
            Ok(())
        }
        PatientsAction::Delete { id } => delete(writer, db, actor, id),
    }
}

fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    args: &AddPatientArgs,
) -> Result<()> {
    let patient = db
        .create_patient(
            actor,
            NewPatient {
                name: args.name.clone(),
                sector: args.sector,
                weekly_hours: args.weekly_hours,
                hourly_rate: args.rate,
                assigned_staff_id: args.staff.clone(),
                guardians: args.guardians.clone(),
            },
        )
        .with_context(|| format!("failed to register patient {}", args.name))?;
    writeln!(writer, "Registered patient {} ({})", patient.name, patient.id)?;
    Ok(())
}

fn delete<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    id: &PatientId,
) -> Result<()> {
    let outcome = db
        .delete_patient(actor, id)
        .with_context(|| format!("failed to delete patient {id}"))?;
    writeln!(writer, "Deleted patient {}", outcome.patient_id)?;
    writeln!(writer, "Attendances removed: {}", outcome.attendances_deleted)?;
    writeln!(writer, "Guardians removed: {}", email_list(&outcome.guardians_deleted))?;
    writeln!(
        writer,
        "Guardians kept (linked to another patient): {}",
        email_list(&outcome.guardians_retained)
    )?;
    if !outcome.guardians_failed.is_empty() {
        writeln!(
            writer,
            "Guardians that could not be removed: {}",
            email_list(&outcome.guardians_failed)
        )?;
    }
    Ok(())
}

fn write_summary<W: Write>(writer: &mut W, patient: &Patient) -> Result<()> {
    let guardians: Vec<&str> = patient.guardian_emails().map(Email::as_str).collect();
    writeln!(
        writer,
        "{}  {} ({})  rate {}  guardians: {}",
        patient.id,
        patient.name,
        patient.sector,
        money(patient.hourly_rate),
        if guardians.is_empty() {
            "none".to_string()
        } else {
            guardians.join(", ")
        }
    )?;
    Ok(())
}

fn email_list(emails: &[Email]) -> String {
    if emails.is_empty() {
        return "none".to_string();
    }
    emails.iter().map(Email::as_str).collect::<Vec<_>>().join(", ")
}
