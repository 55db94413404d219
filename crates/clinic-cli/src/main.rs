use std::io::{self, Write};
use std::process::ExitCode;

use anyhow::{Context, Result, anyhow};
use clap::{CommandFactory, Parser};
use clinic_core::{Identity, ValidationError};
use clinic_db::{Database, DbError, ErrorKind};
use tracing_subscriber::EnvFilter;

use clinic_cli::commands::{attendance, init, patients, rates, report, supervision, users};
use clinic_cli::{Cli, Commands, Config, Environment};

/// Open the database, ensuring the parent directory exists.
fn open_database(config: &Config) -> Result<Database> {
    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }
    Database::open(&config.database_path)
        .with_context(|| format!("failed to open {}", config.database_path.display()))
}

/// Resolve who the command acts as: `--as` first, then the configured actor.
fn acting_identity(cli: &Cli, config: &Config, db: &Database) -> Result<Identity> {
    let id = cli
        .actor
        .as_ref()
        .or(config.actor.as_ref())
        .ok_or_else(|| anyhow!("no acting user; pass --as <USER_ID> or set CLINIC_ACTOR"))?;
    let identity = db
        .identity_for(id)
        .with_context(|| format!("cannot act as {id}"))?;
    tracing::debug!(actor = %identity.id, role = %identity.role, "resolved acting identity");
    Ok(identity)
}

fn dispatch(cli: &Cli, config: &Config, command: &Commands) -> Result<()> {
    let mut db = open_database(config)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match command {
        Commands::Init(args) => init::run(&mut out, &mut db, args),
        command => {
            let actor = acting_identity(cli, config, &db)?;
            run_as(&mut out, &mut db, &actor, command)
        }
    }
}

fn run_as<W: Write>(
    out: &mut W,
    db: &mut Database,
    actor: &Identity,
    command: &Commands,
) -> Result<()> {
    match command {
        Commands::Init(args) => init::run(out, db, args),
        Commands::Users(action) => users::run(out, db, actor, action),
        Commands::Patients(action) => patients::run(out, db, actor, action),
        Commands::Attendance(action) => attendance::run(out, db, actor, action),
        Commands::Supervision(action) => supervision::run(out, db, actor, action),
        Commands::Rates(action) => rates::run(out, db, actor, action),
        Commands::Report(action) => report::run(out, db, actor, action),
    }
}

/// The first domain error in the chain and its class.
fn classify(err: &anyhow::Error) -> Option<(ErrorKind, String)> {
    err.chain().find_map(|cause| {
        if let Some(db_err) = cause.downcast_ref::<DbError>() {
            Some((db_err.kind(), db_err.to_string()))
        } else {
            cause
                .downcast_ref::<ValidationError>()
                .map(|invalid| (ErrorKind::InvalidInput, invalid.to_string()))
        }
    })
}

const fn exit_code(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::InvalidInput => 2,
        ErrorKind::Forbidden => 3,
        ErrorKind::NotFound => 4,
        ErrorKind::Conflict => 5,
        ErrorKind::Internal => 1,
    }
}

fn report_error(err: &anyhow::Error, environment: Environment) -> ExitCode {
    let classified = classify(err);
    let kind = classified.as_ref().map_or(ErrorKind::Internal, |(kind, _)| *kind);
    let mut stderr = io::stderr().lock();
    let _ = match (environment, classified) {
        (Environment::Development, _) => writeln!(stderr, "error ({kind}): {err:?}"),
        (Environment::Production, Some((kind, message))) if kind != ErrorKind::Internal => {
            writeln!(stderr, "error ({}): {message}", kind.status_code())
        }
        (Environment::Production, _) => {
            writeln!(stderr, "error ({}): {kind}", kind.status_code())
        }
    };
    ExitCode::from(exit_code(kind))
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        let _ = Cli::command().print_help();
        println!();
        return ExitCode::SUCCESS;
    };

    let config = match Config::load_from(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: failed to load configuration: {err}");
            return ExitCode::FAILURE;
        }
    };
    tracing::debug!(?config, "loaded configuration");

    match dispatch(&cli, &config, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => report_error(&err, config.environment),
    }
}
