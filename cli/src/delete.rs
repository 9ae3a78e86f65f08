use crate::error::{self, Result};
use crate::fleet;
use argh::FromArgs;
use snafu::ResultExt;
use std::path::Path;

#[derive(Debug, FromArgs, PartialEq)]
#[argh(
    subcommand,
    name = "delete",
    description = "delete every resource the fleet owns"
)]
pub(crate) struct Delete {}

impl Delete {
    pub(crate) async fn run(&self, path: &Path) -> Result<()> {
        let deployer = fleet::deployer(path).await?;
        // Keep a copy of what existed before the configuration is emptied.
        deployer
            .config()
            .await
            .backup()
            .context(error::BackupSnafu)?;
        deployer.delete().await.context(error::ProvisionSnafu)
    }
}
