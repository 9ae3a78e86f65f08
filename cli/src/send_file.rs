use crate::error::{self, Result};
use crate::fleet;
use argh::FromArgs;
use snafu::ResultExt;
use std::path::{Path, PathBuf};

#[derive(Debug, FromArgs, PartialEq)]
#[argh(
    subcommand,
    name = "send-file",
    description = "copy a local file to every instance"
)]
pub(crate) struct SendFile {
    /// the file to send
    #[argh(option)]
    local: PathBuf,

    /// where to write the file on each instance
    #[argh(option)]
    remote: String,
}

impl SendFile {
    pub(crate) async fn run(&self, path: &Path) -> Result<()> {
        fleet::deployer(path)
            .await?
            .send_file_to_all(&self.local, &self.remote)
            .await
            .context(error::ProvisionSnafu)
    }
}
