use super::args::{Cli, Command};
use crate::exit_codes;

pub mod check;
pub mod inspect;
pub mod pack;
pub mod verify;

pub async fn dispatch(cli: Cli) -> i32 {
    match cli.cmd {
        Command::Inspect(args) => inspect::cmd_inspect(args),
        Command::Pack(args) => pack::cmd_pack(args),
        Command::Verify(args) => verify::cmd_verify(args).await,
        Command::Check(args) => check::cmd_check(args).await,
        Command::Version => {
            println!("{}", env!("CARGO_PKG_VERSION"));
            exit_codes::SUCCESS
        }
    }
}

/// Print the error chain and pick an exit code from its root cause.
pub(crate) fn report_failure(e: &anyhow::Error, quiet: bool) -> i32 {
    if !quiet {
        eprintln!("error: {e:#}");
    }
    if let Some(rejection) = e.downcast_ref::<safeload_core::Rejection>() {
        rejection.exit_code()
    } else if let Some(gate_err) = e.downcast_ref::<safeload_core::GateError>() {
        gate_err.exit_code()
    } else {
        exit_codes::CONFIG_ERROR
    }
}
