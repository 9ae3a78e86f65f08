use crate::error::{self, Result};
use crate::fleet;
use argh::FromArgs;
use snafu::{ensure, ResultExt};
use std::path::Path;

#[derive(Debug, FromArgs, PartialEq)]
#[argh(
    subcommand,
    name = "wait",
    description = "wait for instances to finish booting"
)]
pub(crate) struct Wait {
    /// an instance to wait for, may be repeated
    #[argh(option)]
    instance_id: Vec<String>,

    /// wait for every instance of the fleet
    #[argh(switch)]
    all: bool,
}

impl Wait {
    pub(crate) async fn run(&self, path: &Path) -> Result<()> {
        ensure!(
            self.all || !self.instance_id.is_empty(),
            error::WaitTargetSnafu
        );
        let deployer = fleet::deployer(path).await?;
        let result = if self.all {
            deployer.wait_for_ready().await
        } else {
            deployer.wait_for_instances(&self.instance_id).await
        };
        result.context(error::ProvisionSnafu)
    }
}
