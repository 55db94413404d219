//! Rates command: the per-sector supervision rate table.

use std::io::Write;

use anyhow::{Context, Result};
use clap::Subcommand;
use clinic_core::{Identity, RateTable, Sector, SupervisionRates};
use clinic_db::Database;

use super::util::{money, write_json};

#[derive(Debug, Subcommand)]
pub enum RatesAction {
    /// Show the current rates.
    Show {
        #[arg(long)]
        json: bool,
    },
    /// Replace the rate table. Sectors left out fall back to the default rate.
    Set {
        /// `sector=rate` pairs, e.g. `aba=50 denver=42.5`.
        #[arg(value_parser = parse_rate, required = true)]
        rates: Vec<(Sector, f64)>,
        /// Fail unless the table is still at this version.
        #[arg(long)]
        expect_version: Option<i64>,
    },
}

fn parse_rate(value: &str) -> Result<(Sector, f64), String> {
    let (sector, rate) = value
        .split_once('=')
        .ok_or_else(|| format!("expected sector=rate, got {value:?}"))?;
    let sector: Sector = sector.trim().parse().map_err(|err| format!("{err}"))?;
    let rate: f64 = rate
        .trim()
        .parse()
        .map_err(|_| format!("invalid rate {:?}", rate.trim()))?;
    Ok((sector, rate))
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    action: &RatesAction,
) -> Result<()> {
    match action {
        RatesAction::Show { json } => {
            let table = db.supervision_rates()?;
            if *json {
                return write_json(writer, &table);
            }
            write_table(writer, &table)
        }
        RatesAction::Set {
            rates,
            expect_version,
        } => {
            let rates = SupervisionRates::new(rates.iter().copied())?;
            let table = db
                .save_supervision_rates(actor, rates, *expect_version)
                .context("failed to save supervision rates")?;
            write_table(writer, &table)
        }
    }
}

fn write_table<W: Write>(writer: &mut W, table: &RateTable) -> Result<()> {
    writeln!(writer, "Supervision rates (version {})", table.version)?;
    for sector in Sector::ALL {
        let configured = table.rates.configured().any(|(configured, _)| configured == sector);
        writeln!(
            writer,
            "{sector}: {}{}",
            money(table.rates.rate_for(sector)),
            if configured { "" } else { " (default)" }
        )?;
    }
    Ok(())
}
