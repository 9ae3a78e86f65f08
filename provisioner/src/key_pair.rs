use crate::clients::Clients;
use crate::error::{self, Result};
use crate::policy::PollPolicy;
use fleet_model::FleetConfig;
use log::{info, warn};
use snafu::{ensure, ResultExt};
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Create the fleet's key pair and write its private key to `key_path`. The local key file is
/// removed if anything goes wrong.
pub(crate) async fn create_key_pair(config: &FleetConfig, clients: &Clients) -> Result<()> {
    ensure!(
        !config.key_name.is_empty(),
        error::ValidationSnafu {
            what: "cannot create key pair without key name"
        }
    );
    if let Err(e) = request_and_write(config, clients).await {
        remove_key_file(&config.key_path).await;
        warn!("Removed private key since creating the key pair failed: {}", e);
        return Err(e);
    }
    info!(
        "Created key pair '{}' at '{}'",
        config.key_name,
        config.key_path.display()
    );
    clients.checkpoint_or_warn(config).await;
    Ok(())
}

async fn request_and_write(config: &FleetConfig, clients: &Clients) -> Result<()> {
    let key_pair = clients
        .cloud
        .create_key_pair(&config.key_name)
        .await
        .context(error::CreateKeyPairSnafu {
            key_name: &config.key_name,
        })?;
    if key_pair.name != config.key_name {
        // Rollback only knows the requested name.
        if let Err(e) = clients.cloud.delete_key_pair(&key_pair.name).await {
            warn!("Unable to delete key pair '{}': {}", key_pair.name, e);
        }
        return error::KeyNameMismatchSnafu {
            requested: &config.key_name,
            returned: key_pair.name,
        }
        .fail();
    }
    let path = &config.key_path;
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(dir)
            .await
            .context(error::WriteKeySnafu { path })?;
    }
    tokio::fs::write(path, key_pair.material.as_bytes())
        .await
        .context(error::WriteKeySnafu { path })?;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
        .await
        .context(error::WriteKeySnafu { path })?;
    Ok(())
}

async fn remove_key_file(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Unable to remove '{}': {}", path.display(), e),
    }
}

/// Delete the key pair and confirm that EC2 no longer knows it.
pub(crate) async fn delete_key_pair(
    config: &FleetConfig,
    clients: &Clients,
    policy: &PollPolicy,
) -> Result<()> {
    ensure!(
        !config.key_name.is_empty(),
        error::ValidationSnafu {
            what: "cannot delete key pair without key name"
        }
    );
    let key_name = &config.key_name;
    clients
        .cloud
        .delete_key_pair(key_name)
        .await
        .context(error::DeleteKeyPairSnafu { key_name })?;

    tokio::time::sleep(policy.key_pair_settle).await;

    match clients.cloud.describe_key_pair(key_name).await {
        Ok(()) => error::KeyPairStillExistsSnafu { key_name }.fail(),
        Err(e) if e.is_not_found() => {
            info!("Deleted key pair '{}'", key_name);
            Ok(())
        }
        Err(e) => Err(e).context(error::DescribeKeyPairSnafu { key_name }),
    }
}
