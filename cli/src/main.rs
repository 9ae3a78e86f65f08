mod create;
mod create_config;
mod delete;
mod env_help;
mod error;
mod fleet;
mod logging;
mod send_file;
mod ssh_commands;
mod wait;

use argh::FromArgs;
use error::Result;
use log::LevelFilter;
use logging::{init_logger, LogSettings};
use std::path::PathBuf;

#[derive(FromArgs)]
/// Provision, wait for, and tear down a fleet of EC2 instances for test clusters.
struct Args {
    /// set logging verbosity [trace|debug|info|warn|error], defaulting to the configuration's
    /// `logLevel` or info. If the environment variable `RUST_LOG` is present, it overrides the
    /// default logging behavior. See https://docs.rs/env_logger/latest
    #[argh(option)]
    log_level: Option<LevelFilter>,

    /// path of the fleet configuration file
    #[argh(option, short = 'p', default = "PathBuf::from(\"fleet.yaml\")")]
    path: PathBuf,

    #[argh(subcommand)]
    command: Command,
}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
enum Command {
    /// Write a default configuration
    CreateConfig(create_config::CreateConfig),
    /// Create the fleet
    Create(create::Create),
    /// Delete the fleet
    Delete(delete::Delete),
    /// Wait for instances to finish booting
    Wait(wait::Wait),
    /// Print SSH commands for the fleet
    SshCommands(ssh_commands::SshCommands),
    /// Copy a file to every instance
    SendFile(send_file::SendFile),
    /// List the supported environment variables
    EnvHelp(env_help::EnvHelp),
}

/// Exit code of a run that was interrupted by SIGINT or SIGTERM.
pub(crate) const INTERRUPTED_EXIT_CODE: i32 = 130;

#[tokio::main]
async fn main() {
    let args: Args = argh::from_env();
    init_logger(LogSettings::new(args.log_level, &args.path));
    if let Err(e) = run(args).await {
        eprintln!("{}", e);
        if e.is_interrupted() {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        }
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let path = args.path;
    match args.command {
        Command::CreateConfig(create_config) => create_config.run(&path).await,
        Command::Create(create) => create.run(&path).await,
        Command::Delete(delete) => delete.run(&path).await,
        Command::Wait(wait) => wait.run(&path).await,
        Command::SshCommands(ssh_commands) => ssh_commands.run(&path).await,
        Command::SendFile(send_file) => send_file.run(&path).await,
        Command::EnvHelp(env_help) => env_help.run().await,
    }
}
