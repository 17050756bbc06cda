use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::CliResult;

pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the protocol server on a Unix domain socket.
    Serve(ServeArgs),
    /// Show version information.
    Version,
}

pub async fn run(command: Command) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args).await,
        Command::Version => version::run(),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,

    /// Server name reported in the handshake.
    #[arg(long, default_value = "haptik server")]
    pub name: String,

    /// Register a demo device at startup (repeatable), e.g. `Cueme_2`.
    /// Demo devices log their writes instead of touching hardware.
    #[arg(long = "demo-device", value_name = "NAME")]
    pub demo_devices: Vec<String>,
}
