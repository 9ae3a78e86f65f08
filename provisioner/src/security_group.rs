use crate::clients::{Clients, IngressRule};
use crate::error::{self, Result};
use crate::network::retry_in_use;
use crate::policy::PollPolicy;
use fleet_model::FleetConfig;
use log::info;
use snafu::{ensure, ResultExt};

/// The name of the security group created for a fleet.
pub fn security_group_name(fleet_id: &str) -> String {
    format!("{}-security-group", fleet_id)
}

/// Create the fleet's security group and open `ingress_ports` to the world.
pub(crate) async fn create_security_group(
    config: &mut FleetConfig,
    clients: &Clients,
) -> Result<()> {
    ensure!(
        !config.vpc_id.is_empty(),
        error::ValidationSnafu {
            what: "cannot create security group without vpc id"
        }
    );
    let name = security_group_name(&config.id);
    let group_id = clients
        .cloud
        .create_security_group(
            &name,
            &format!("Security group for fleet '{}'", config.id),
            &config.vpc_id,
        )
        .await
        .context(error::CreateSecurityGroupSnafu { name: &name })?;
    info!("Created security group '{}' ({})", name, group_id);
    config.security_group_id = Some(group_id.clone());
    if !config.security_group_ids.contains(&group_id) {
        config.security_group_ids.push(group_id.clone());
    }
    clients.checkpoint_or_warn(config).await;

    let rules: Vec<IngressRule> = config
        .ingress_ports
        .iter()
        .map(|port| IngressRule::tcp_from_anywhere(*port))
        .collect();
    clients
        .cloud
        .authorize_ingress(&group_id, &rules)
        .await
        .context(error::AuthorizeIngressSnafu {
            group_id: &group_id,
        })?;
    info!(
        "Authorized ingress on ports {:?} for '{}'",
        config.ingress_ports, group_id
    );
    Ok(())
}

/// Delete the security group created for the fleet. Groups supplied by the user are left alone.
pub(crate) async fn delete_security_group(
    config: &mut FleetConfig,
    clients: &Clients,
    policy: &PollPolicy,
) -> Result<()> {
    let group_id = match config.security_group_id.clone() {
        Some(group_id) => group_id,
        None => return Ok(()),
    };
    let cloud = &clients.cloud;
    let id = group_id.as_str();
    retry_in_use(policy, id, move || cloud.delete_security_group(id))
        .await
        .context(error::DeleteSecurityGroupSnafu { group_id: id })?;
    info!("Deleted security group '{}'", group_id);
    config.security_group_ids.retain(|id| id != &group_id);
    config.security_group_id = None;
    clients.checkpoint_or_warn(config).await;
    Ok(())
}
