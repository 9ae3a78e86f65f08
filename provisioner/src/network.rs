use crate::clients::{ClientResult, Clients, SubnetFilter};
use crate::error::{self, Error, Result};
use crate::policy::PollPolicy;
use fleet_model::FleetConfig;
use log::{debug, info, warn};
use snafu::{ensure, ResultExt};
use std::future::Future;
use std::net::Ipv4Addr;

/// A created VPC gets at most this many subnets, one per availability zone.
const MAX_SUBNETS: usize = 3;

/// Carve `count` subnet blocks out of `vpc_cidr`. The VPC block is split in eighths and the
/// subnets take the third, fourth and fifth of them, so `192.168.0.0/16` yields
/// `192.168.64.0/19`, `192.168.96.0/19` and `192.168.128.0/19`.
pub fn subnet_cidrs(vpc_cidr: &str, count: usize) -> Result<Vec<String>> {
    let invalid = || Error::Validation {
        what: format!("'{}' is not a usable IPv4 CIDR block", vpc_cidr),
    };
    let (address, prefix) = vpc_cidr.split_once('/').ok_or_else(invalid)?;
    let address: Ipv4Addr = address.trim().parse().map_err(|_| invalid())?;
    let prefix: u32 = prefix.trim().parse().map_err(|_| invalid())?;
    // Each subnet needs room for the addresses AWS reserves.
    ensure!(
        prefix <= 25,
        error::ValidationSnafu {
            what: format!("'{}' is too small to hold {} subnets", vpc_cidr, MAX_SUBNETS)
        }
    );
    ensure!(
        count <= MAX_SUBNETS,
        error::ValidationSnafu {
            what: format!("at most {} subnets can be carved from the vpc", MAX_SUBNETS)
        }
    );
    let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
    let base = u32::from(address) & mask;
    let subnet_prefix = prefix + 3;
    let block = 1u32 << (32 - subnet_prefix);
    Ok((2..2 + count as u32)
        .map(|index| format!("{}/{}", Ipv4Addr::from(base + index * block), subnet_prefix))
        .collect())
}

/// Create a VPC with an internet gateway, route table and subnets, or look up the subnets of the
/// configured VPC.
pub(crate) async fn create_network(config: &mut FleetConfig, clients: &Clients) -> Result<()> {
    if config.vpc_id.is_empty() {
        create_vpc(config, clients).await
    } else {
        use_existing_vpc(config, clients).await
    }
}

async fn create_vpc(config: &mut FleetConfig, clients: &Clients) -> Result<()> {
    let cloud = &clients.cloud;
    // Validate the block before creating anything.
    subnet_cidrs(&config.vpc_cidr, 0)?;

    let vpc_id = cloud
        .create_vpc(&config.vpc_cidr, &config.id)
        .await
        .context(error::CreateVpcSnafu)?;
    info!("Created vpc '{}' with '{}'", vpc_id, config.vpc_cidr);
    config.vpc_id = vpc_id;
    config.vpc_created = true;
    clients.checkpoint_or_warn(config).await;

    let gateway_id = cloud
        .create_internet_gateway(&config.vpc_id)
        .await
        .context(error::CreateInternetGatewaySnafu)?;
    info!("Created internet gateway '{}'", gateway_id);
    config.internet_gateway_id = Some(gateway_id.clone());
    clients.checkpoint_or_warn(config).await;

    let route_table_id = cloud
        .create_route_table(&config.vpc_id, &gateway_id)
        .await
        .context(error::CreateRouteTableSnafu)?;
    info!("Created route table '{}'", route_table_id);
    config.route_table_id = Some(route_table_id.clone());
    clients.checkpoint_or_warn(config).await;

    let mut zones = cloud
        .availability_zones()
        .await
        .context(error::AvailabilityZonesSnafu)?;
    zones.truncate(MAX_SUBNETS);
    ensure!(
        !zones.is_empty(),
        error::ValidationSnafu {
            what: format!("region '{}' has no available zones", config.region)
        }
    );
    let cidrs = subnet_cidrs(&config.vpc_cidr, zones.len())?;
    for (zone, cidr) in zones.iter().zip(cidrs) {
        let subnet = cloud
            .create_subnet(&config.vpc_id, &cidr, zone)
            .await
            .context(error::CreateSubnetSnafu { cidr: &cidr })?;
        info!(
            "Created subnet '{}' with '{}' in '{}'",
            subnet.subnet_id, cidr, subnet.availability_zone
        );
        config.subnet_ids.push(subnet.subnet_id.clone());
        config
            .subnet_id_to_availability_zone
            .insert(subnet.subnet_id.clone(), subnet.availability_zone);
        clients.checkpoint_or_warn(config).await;

        cloud
            .associate_route_table(&route_table_id, &subnet.subnet_id)
            .await
            .context(error::AssociateRouteTableSnafu {
                subnet_id: &subnet.subnet_id,
            })?;
    }
    Ok(())
}

async fn use_existing_vpc(config: &mut FleetConfig, clients: &Clients) -> Result<()> {
    let filter = if config.subnet_ids.is_empty() {
        SubnetFilter::Vpc(config.vpc_id.clone())
    } else {
        SubnetFilter::Ids(config.subnet_ids.clone())
    };
    let subnets = clients
        .cloud
        .describe_subnets(filter)
        .await
        .context(error::DescribeSubnetsSnafu)?;

    if config.subnet_ids.is_empty() {
        config.subnet_ids = subnets.iter().map(|s| s.subnet_id.clone()).collect();
    } else if let Some(missing) = config
        .subnet_ids
        .iter()
        .find(|id| !subnets.iter().any(|s| &s.subnet_id == *id))
    {
        return error::ValidationSnafu {
            what: format!("subnet '{}' was not found", missing),
        }
        .fail();
    }
    ensure!(
        !config.subnet_ids.is_empty(),
        error::ValidationSnafu {
            what: format!("vpc '{}' has no subnets", config.vpc_id)
        }
    );
    for subnet in subnets {
        if subnet.vpc_id.is_empty() || subnet.vpc_id == config.vpc_id {
            config
                .subnet_id_to_availability_zone
                .insert(subnet.subnet_id, subnet.availability_zone);
        } else {
            return error::ValidationSnafu {
                what: format!(
                    "subnet '{}' belongs to '{}', not '{}'",
                    subnet.subnet_id, subnet.vpc_id, config.vpc_id
                ),
            }
            .fail();
        }
    }
    info!(
        "Found subnets {:?} in vpc '{}'",
        config.subnet_id_to_availability_zone, config.vpc_id
    );
    clients.checkpoint_or_warn(config).await;
    Ok(())
}

/// Make instances in every subnet reachable over SSH by giving them public addresses.
pub(crate) async fn enable_ssh(config: &FleetConfig, clients: &Clients) -> Result<()> {
    for subnet_id in &config.subnet_ids {
        clients
            .cloud
            .enable_public_ip(subnet_id)
            .await
            .context(error::EnablePublicIpSnafu { subnet_id })?;
        debug!("Enabled public ips on '{}'", subnet_id);
    }
    info!("Modified subnets {:?} to allow SSH access", config.subnet_ids);
    Ok(())
}

/// Delete the subnets of a created VPC. Every subnet is attempted; the first failure is returned.
pub(crate) async fn delete_subnets(
    config: &mut FleetConfig,
    clients: &Clients,
    policy: &PollPolicy,
) -> Result<()> {
    if !config.vpc_created {
        return Ok(());
    }
    let mut first_error = None;
    let mut remaining = Vec::new();
    for subnet_id in std::mem::take(&mut config.subnet_ids) {
        let cloud = &clients.cloud;
        let id = subnet_id.as_str();
        match retry_in_use(policy, id, move || cloud.delete_subnet(id)).await {
            Ok(()) => {
                info!("Deleted subnet '{}'", subnet_id);
                config.subnet_id_to_availability_zone.remove(&subnet_id);
            }
            Err(e) => {
                warn!("Unable to delete subnet '{}': {}", subnet_id, e);
                if first_error.is_none() {
                    first_error = Some(Error::DeleteNetwork {
                        what: "subnet".to_string(),
                        id: subnet_id.clone(),
                        source: e,
                    });
                }
                remaining.push(subnet_id);
            }
        }
    }
    config.subnet_ids = remaining;
    clients.checkpoint_or_warn(config).await;
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Delete the route table, internet gateway and VPC of a created VPC, in that order.
pub(crate) async fn delete_vpc(
    config: &mut FleetConfig,
    clients: &Clients,
    policy: &PollPolicy,
) -> Result<()> {
    if !config.vpc_created {
        return Ok(());
    }
    let cloud = &clients.cloud;
    if let Some(route_table_id) = config.route_table_id.clone() {
        let id = route_table_id.as_str();
        retry_in_use(policy, id, move || cloud.delete_route_table(id))
            .await
            .context(error::DeleteNetworkSnafu {
                what: "route table",
                id,
            })?;
        info!("Deleted route table '{}'", route_table_id);
        config.route_table_id = None;
        clients.checkpoint_or_warn(config).await;
    }
    if let Some(gateway_id) = config.internet_gateway_id.clone() {
        let id = gateway_id.as_str();
        let vpc_id = config.vpc_id.as_str();
        retry_in_use(policy, id, move || cloud.delete_internet_gateway(id, vpc_id))
            .await
            .context(error::DeleteNetworkSnafu {
                what: "internet gateway",
                id,
            })?;
        info!("Deleted internet gateway '{}'", gateway_id);
        config.internet_gateway_id = None;
        clients.checkpoint_or_warn(config).await;
    }
    if !config.vpc_id.is_empty() {
        let vpc_id = config.vpc_id.clone();
        let id = vpc_id.as_str();
        retry_in_use(policy, id, move || cloud.delete_vpc(id))
            .await
            .context(error::DeleteNetworkSnafu { what: "vpc", id })?;
        info!("Deleted vpc '{}'", vpc_id);
    }
    config.vpc_id.clear();
    config.vpc_created = false;
    config.subnet_ids.clear();
    config.subnet_id_to_availability_zone.clear();
    clients.checkpoint_or_warn(config).await;
    Ok(())
}

/// Run a delete, treating a missing resource as deleted and retrying while the resource is still
/// in use by something that is shutting down.
pub(crate) async fn retry_in_use<F, Fut>(
    policy: &PollPolicy,
    resource: &str,
    mut delete: F,
) -> ClientResult<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ClientResult<()>>,
{
    let mut attempt = 1;
    loop {
        match delete().await {
            Ok(()) => return Ok(()),
            Err(e) if e.is_not_found() => {
                debug!("'{}' is already gone: {}", resource, e);
                return Ok(());
            }
            Err(e) if e.is_dependency_violation() && attempt < policy.dependency_retry_attempts => {
                info!(
                    "'{}' is still in use, retrying in {:?}",
                    resource, policy.dependency_retry_interval
                );
                tokio::time::sleep(policy.dependency_retry_interval).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod test {
    use super::subnet_cidrs;

    #[test]
    fn default_vpc_block() {
        assert_eq!(
            subnet_cidrs("192.168.0.0/16", 3).unwrap(),
            vec!["192.168.64.0/19", "192.168.96.0/19", "192.168.128.0/19"]
        );
    }

    #[test]
    fn fewer_zones_take_fewer_blocks() {
        assert_eq!(
            subnet_cidrs("10.0.0.0/16", 2).unwrap(),
            vec!["10.0.64.0/19", "10.0.96.0/19"]
        );
    }

    #[test]
    fn host_bits_are_masked() {
        assert_eq!(
            subnet_cidrs("10.1.2.3/24", 1).unwrap(),
            vec!["10.1.2.64/27"]
        );
    }

    #[test]
    fn rejects_unusable_blocks() {
        assert!(subnet_cidrs("192.168.0.0", 3).is_err());
        assert!(subnet_cidrs("not-an-ip/16", 3).is_err());
        assert!(subnet_cidrs("192.168.0.0/27", 3).is_err());
        assert!(subnet_cidrs("192.168.0.0/16", 4).is_err());
    }
}
