use crate::error::{self, Result};
use crate::fleet;
use argh::FromArgs;
use log::info;
use snafu::ResultExt;
use std::path::Path;

#[derive(Debug, FromArgs, PartialEq)]
#[argh(subcommand, name = "create", description = "create the fleet")]
pub(crate) struct Create {
    /// wait for every instance to finish booting, even if the configuration does not ask to
    #[argh(switch)]
    wait: bool,
}

impl Create {
    pub(crate) async fn run(&self, path: &Path) -> Result<()> {
        let deployer = fleet::deployer(path).await?;
        deployer.create().await.context(error::ProvisionSnafu)?;
        let config = deployer.config().await;
        if self.wait || config.wait {
            deployer
                .wait_for_ready()
                .await
                .context(error::ProvisionSnafu)?;
        }
        info!(
            "Fleet '{}' has {} instance(s)",
            config.id,
            config.instances.len()
        );
        println!("{}", deployer.ssh_commands().await);
        Ok(())
    }
}
