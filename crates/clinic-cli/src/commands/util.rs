//! Output helpers shared by the subcommands.

use std::io::Write;

use anyhow::Result;
use clinic_core::{Role, Sector};
use serde::Serialize;

/// Writes `value` as pretty JSON followed by a newline.
pub fn write_json<W: Write, T: Serialize + ?Sized>(writer: &mut W, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(&mut *writer, value)?;
    writeln!(writer)?;
    Ok(())
}

/// `role` or `role:sector`, the same form `--role` accepts.
pub fn role_label(role: Role, sector: Option<Sector>) -> String {
    match sector {
        Some(sector) => format!("{role}:{sector}"),
        None => role.to_string(),
    }
}

pub fn money(value: f64) -> String {
    format!("{value:.2}")
}

pub fn hours(value: f64) -> String {
    format!("{value:.2}h")
}
