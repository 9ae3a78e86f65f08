use crate::error::{self, Result};
use argh::FromArgs;
use fleet_model::FleetConfig;
use log::info;
use snafu::{ensure, ResultExt};
use std::path::Path;

#[derive(Debug, FromArgs, PartialEq)]
#[argh(
    subcommand,
    name = "create-config",
    description = "write a default configuration, with environment overrides applied"
)]
pub(crate) struct CreateConfig {}

impl CreateConfig {
    pub(crate) async fn run(&self, path: &Path) -> Result<()> {
        ensure!(
            !path.exists(),
            error::ConfigExistsSnafu {
                path: path.to_path_buf()
            }
        );
        let mut config = FleetConfig::default_for(path);
        let applied = config
            .apply_env_overrides()
            .context(error::EnvOverridesSnafu)?;
        config.sync().context(error::SyncSnafu)?;
        info!(
            "Wrote configuration for '{}' to '{}' ({} environment override(s))",
            config.id,
            path.display(),
            applied.len()
        );
        Ok(())
    }
}
