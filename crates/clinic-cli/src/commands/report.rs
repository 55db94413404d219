//! Report command: monthly guardian billing and staff payment.

use std::io::Write;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use clinic_core::{GuardianBillingRow, Identity, ReportPeriod, StaffPaymentRow};
use clinic_db::Database;

use super::util::{hours, money, write_json};

#[derive(Debug, Subcommand)]
pub enum ReportAction {
    /// What each patient's guardians owe for the month.
    Guardians(PeriodArgs),
    /// What the clinic owes each staff member for the month.
    Staff(PeriodArgs),
}

#[derive(Debug, Args)]
pub struct PeriodArgs {
    #[arg(long)]
    pub month: u32,
    #[arg(long)]
    pub year: i32,
    #[arg(long)]
    pub json: bool,
}

impl PeriodArgs {
    fn period(&self) -> Result<ReportPeriod> {
        Ok(ReportPeriod::new(self.month, self.year)?)
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &Database,
    actor: &Identity,
    action: &ReportAction,
) -> Result<()> {
    match action {
        ReportAction::Guardians(args) => {
            let period = args.period()?;
            let rows = db
                .guardian_billing_report(actor, period)
                .context("failed to build the guardian billing report")?;
            if args.json {
                return write_json(writer, &rows);
            }
            write_guardian_report(writer, period, &rows)
        }
        ReportAction::Staff(args) => {
            let period = args.period()?;
            let rows = db
                .staff_payment_report(actor, period)
                .context("failed to build the staff payment report")?;
            if args.json {
                return write_json(writer, &rows);
            }
            write_staff_report(writer, period, &rows)
        }
    }
}

fn write_guardian_report<W: Write>(
    writer: &mut W,
    period: ReportPeriod,
    rows: &[GuardianBillingRow],
) -> Result<()> {
    writeln!(writer, "Guardian billing for {:02}/{}", period.month, period.year)?;
    if rows.is_empty() {
        writeln!(writer, "No sessions recorded.")?;
        return Ok(());
    }
    for row in rows {
        writeln!(
            writer,
            "{} ({}): {} sessions, {} confirmed ({:.1}%){}",
            row.patient_name,
            row.sector,
            row.total_sessions,
            row.confirmed_sessions,
            row.confirmation_rate,
            if row.at_risk { " AT RISK" } else { "" }
        )?;
        writeln!(
            writer,
            "  confirmed {} = {}, pending {} = {}, total {}",
            hours(row.confirmed_hours),
            money(row.confirmed_value),
            hours(row.pending_hours),
            money(row.pending_value),
            money(row.total_value)
        )?;
    }
    let confirmed: f64 = rows.iter().map(|row| row.confirmed_value).sum();
    let total: f64 = rows.iter().map(|row| row.total_value).sum();
    writeln!(writer, "Confirmed: {}  Projected: {}", money(confirmed), money(total))?;
    Ok(())
}

fn write_staff_report<W: Write>(
    writer: &mut W,
    period: ReportPeriod,
    rows: &[StaffPaymentRow],
) -> Result<()> {
    writeln!(writer, "Staff payment for {:02}/{}", period.month, period.year)?;
    if rows.is_empty() {
        writeln!(writer, "No confirmed hours.")?;
        return Ok(());
    }
    for row in rows {
        let sector = row
            .sector
            .map_or_else(|| "no sector".to_string(), |sector| sector.to_string());
        writeln!(writer, "{} ({sector}): total {}", row.staff_name, money(row.total_payment))?;
        writeln!(
            writer,
            "  sessions {} x {} = {} ({} sessions)",
            hours(row.session_hours),
            money(row.hourly_rate),
            money(row.session_payment),
            row.session_count
        )?;
        writeln!(
            writer,
            "  supervision {} x {} = {}",
            hours(row.supervision_hours),
            money(row.supervision_rate),
            money(row.supervision_payment)
        )?;
    }
    let total: f64 = rows.iter().map(|row| row.total_payment).sum();
    writeln!(writer, "Total: {}", money(total))?;
    Ok(())
}
