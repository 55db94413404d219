//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clinic_core::UserId;

use crate::commands::attendance::AttendanceAction;
use crate::commands::init::InitArgs;
use crate::commands::patients::PatientsAction;
use crate::commands::rates::RatesAction;
use crate::commands::report::ReportAction;
use crate::commands::supervision::SupervisionAction;
use crate::commands::users::UsersAction;

/// Clinic attendance and billing administration.
///
/// Records therapy sessions, walks them through confirmation, approval and
/// launch, and produces the monthly guardian billing and staff payment reports.
#[derive(Debug, Parser)]
#[command(name = "clinic", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Act as this user id, overriding the configured actor.
    #[arg(long = "as", global = true, value_name = "USER_ID")]
    pub actor: Option<UserId>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create the database and its first general admin.
    Init(InitArgs),

    /// Manage staff, admin and billing users.
    #[command(subcommand)]
    Users(UsersAction),

    /// Register, inspect and remove patients.
    #[command(subcommand)]
    Patients(PatientsAction),

    /// Record sessions and move them through the lifecycle.
    #[command(subcommand)]
    Attendance(AttendanceAction),

    /// Record supervision hours.
    #[command(subcommand)]
    Supervision(SupervisionAction),

    /// Show or replace the supervision rate table.
    #[command(subcommand)]
    Rates(RatesAction),

    /// Monthly financial reports.
    #[command(subcommand)]
    Report(ReportAction),
}
