//! Init command: creates the schema and the first general admin.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Args;
use clinic_db::Database;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Display name of the general admin.
    #[arg(long)]
    pub name: String,
    /// Login email of the general admin.
    #[arg(long)]
    pub email: String,
    /// Initial credential for the general admin.
    #[arg(long)]
    pub credential: String,
}

pub fn run<W: Write>(writer: &mut W, db: &mut Database, args: &InitArgs) -> Result<()> {
    let admin = db
        .bootstrap_admin(&args.name, &args.email, &args.credential)
        .context("failed to create the general admin")?;
    writeln!(writer, "Created general admin {} <{}>", admin.name, admin.email)?;
    writeln!(writer, "User id: {}", admin.id)?;
    writeln!(
        writer,
        "Pass --as {} or set CLINIC_ACTOR to act as this user.",
        admin.id
    )?;
    Ok(())
}
