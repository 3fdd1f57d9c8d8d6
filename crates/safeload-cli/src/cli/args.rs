use clap::{Parser, Subcommand};

use super::commands::{check, inspect, pack, verify};

#[derive(Parser, Debug)]
#[command(
    name = "safeload",
    version,
    about = "Signed-download verification: inspect, pack and verify .safe containers"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Show the layout and signer of a signed container
    Inspect(inspect::InspectArgs),

    /// Assemble a signed container from a certificate, a signature and a payload
    Pack(pack::PackArgs),

    /// Verify a signed container and optionally extract its payload
    Verify(verify::VerifyArgs),

    /// Show what the download gate would do with a URL
    Check(check::CheckArgs),

    /// Print version
    Version,
}
