//! Users command: registering and listing non-guardian users.

use std::io::Write;

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use clinic_core::{Identity, NewUser, Role, RoleTag};
use clinic_db::Database;

use super::util::{money, role_label, write_json};

#[derive(Debug, Subcommand)]
pub enum UsersAction {
    /// Register a user.
    Add(AddUserArgs),
    /// List users, optionally of a single role.
    List {
        /// Only users with this role (e.g. `staff`, `reception`).
        #[arg(long)]
        role: Option<Role>,
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Args)]
pub struct AddUserArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: String,
    /// Role, with a sector for staff and sector admins (`staff:aba`).
    #[arg(long)]
    pub role: RoleTag,
    /// Pay per session hour (staff only).
    #[arg(long, default_value_t = 0.0)]
    pub rate: f64,
    /// Initial credential.
    #[arg(long)]
    pub credential: String,
}

pub fn run<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    action: &UsersAction,
) -> Result<()> {
    match action {
        UsersAction::Add(args) => add(writer, db, actor, args),
        UsersAction::List { role, json } => list(writer, db, *role, *json),
    }
}

fn add<W: Write>(
    writer: &mut W,
    db: &mut Database,
    actor: &Identity,
    args: &AddUserArgs,
) -> Result<()> {
    let user = db
        .create_user(
            actor,
            NewUser {
                name: args.name.clone(),
                email: args.email.clone(),
                tag: args.role,
                hourly_rate: args.rate,
            },
            &args.credential,
        )
        .with_context(|| format!("failed to register {}", args.email))?;
    writeln!(
        writer,
        "Registered {} <{}> as {} ({})",
        user.name,
        user.email,
        role_label(user.role, user.sector),
        user.id
    )?;
    Ok(())
}

fn list<W: Write>(writer: &mut W, db: &Database, role: Option<Role>, json: bool) -> Result<()> {
    let users = db.list_users(role)?;
    if json {
        return write_json(writer, &users);
    }
    if users.is_empty() {
        writeln!(writer, "No users.")?;
        return Ok(());
    }
    for user in users {
        let mut line = format!(
            "{}  {} <{}>  {}",
            user.id,
            user.name,
            user.email,
            role_label(user.role, user.sector)
        );
        if user.is_staff() {
            line.push_str(&format!("  rate {}", money(user.hourly_rate)));
        }
        if !user.active {
            line.push_str("  (inactive)");
        }
        writeln!(writer, "{line}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use insta::assert_snapshot;

    use crate::commands::util::testing::Fixture;

    #[test]
    fn add_then_list_staff() {
        let mut fx = Fixture::new();
        let mut output = Vec::new();
        let args = AddUserArgs {
            name: "Rita".to_string(),
            email: "rita@clinic.com".to_string(),
            role: "staff:aba".parse().unwrap(),
            rate: 40.0,
            credential: "secret".to_string(),
        };
        run(&mut output, &mut fx.db, &fx.admin, &UsersAction::Add(args)).unwrap();

        let rita = fx.db.list_users(Some(Role::Staff)).unwrap().remove(0);
        let mut listed = Vec::new();
        run(
            &mut listed,
            &mut fx.db,
            &fx.admin,
            &UsersAction::List {
                role: Some(Role::Staff),
                json: false,
            },
        )
        .unwrap();

        let output = String::from_utf8(output).unwrap() + &String::from_utf8(listed).unwrap();
        let output = output.replace(rita.id.as_str(), "<rita>");
        assert_snapshot!(output, @r"
        Registered Rita <rita@clinic.com> as staff:aba (<rita>)
        <rita>  Rita <rita@clinic.com>  staff:aba  rate 40.00
        ");
    }

    #[test]
    fn staff_cannot_register_users() {
        let mut fx = Fixture::new();
        let staff = fx.user("Rita", "staff:aba", 40.0);
        let args = AddUserArgs {
            name: "Otto".to_string(),
            email: "otto@clinic.com".to_string(),
            role: "reception".parse().unwrap(),
            rate: 0.0,
            credential: "secret".to_string(),
        };
        let err = run(&mut Vec::new(), &mut fx.db, &staff, &UsersAction::Add(args)).unwrap_err();
        assert!(err.to_string().contains("failed to register otto@clinic.com"));
    }

    #[test]
    fn list_json_includes_role_and_sector() {
        let mut fx = Fixture::new();
        fx.user("Rita", "staff:denver", 40.0);
        let mut output = Vec::new();
        run(
            &mut output,
            &mut fx.db,
            &fx.admin,
            &UsersAction::List {
                role: Some(Role::Staff),
                json: true,
            },
        )
        .unwrap();
        let value: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(value[0]["role"], "staff");
        assert_eq!(value[0]["sector"], "denver");
    }
}
