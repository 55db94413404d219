//! CLI subcommand implementations.

pub mod attendance;
pub mod init;
pub mod patients;
pub mod rates;
pub mod report;
pub mod supervision;
pub mod users;
mod util;
