use crate::error::Result;
use crate::fleet::load_config;
use argh::FromArgs;
use std::path::Path;

#[derive(Debug, FromArgs, PartialEq)]
#[argh(
    subcommand,
    name = "ssh-commands",
    description = "print the SSH commands for every instance"
)]
pub(crate) struct SshCommands {}

impl SshCommands {
    pub(crate) async fn run(&self, path: &Path) -> Result<()> {
        let config = load_config(path)?;
        println!("{}", fleet_provisioner::ssh_commands(&config));
        Ok(())
    }
}
