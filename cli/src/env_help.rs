use crate::error::Result;
use argh::FromArgs;

#[derive(Debug, FromArgs, PartialEq)]
#[argh(
    subcommand,
    name = "env-help",
    description = "list the environment variables that override configuration fields"
)]
pub(crate) struct EnvHelp {}

impl EnvHelp {
    pub(crate) async fn run(&self) -> Result<()> {
        print!("{}", fleet_model::render_env_help());
        Ok(())
    }
}
