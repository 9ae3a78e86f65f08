use crate::clients::{Clients, InstanceFilter, InstanceState, RunInstancesRequest};
use crate::error::{self, Result};
use crate::policy::{scaled, PollPolicy};
use fleet_model::{FleetConfig, LaunchBatch};
use log::{debug, info, trace, warn};
use snafu::{ensure, ResultExt};
use std::collections::{BTreeSet, HashMap};
use tokio::time::Instant;
use uuid::Uuid;

/// The most instances asked for by a single `RunInstances` request.
pub const BATCH_CAP: usize = 7;

/// One planned `RunInstances` request.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LaunchRequest {
    pub subnet_id: String,
    pub count: usize,
    /// Pause before sending the next request.
    pub pause_after: bool,
}

/// Spread `count` instances over `subnets`.
///
/// With no more instances than subnets, every instance gets its own request and the subnets are
/// used round robin. Otherwise each subnet gets an equal share, the remainder going one each to
/// the first subnets, and a share larger than `cap` is split into requests of at most `cap`
/// instances that are paced apart.
pub fn plan_launch(count: usize, subnets: &[String], cap: usize) -> Vec<LaunchRequest> {
    if subnets.is_empty() || count == 0 {
        return Vec::new();
    }
    let cap = cap.max(1);
    let mut plan = Vec::new();
    if count <= subnets.len() {
        for i in 0..count {
            plan.push(LaunchRequest {
                subnet_id: subnets[i % subnets.len()].clone(),
                count: 1,
                pause_after: false,
            });
        }
        return plan;
    }

    let share = count / subnets.len();
    let remainder = count % subnets.len();
    for (i, subnet_id) in subnets.iter().enumerate() {
        let mut left = share + usize::from(i < remainder);
        if left <= cap {
            plan.push(LaunchRequest {
                subnet_id: subnet_id.clone(),
                count: left,
                pause_after: false,
            });
            continue;
        }
        while left > 0 {
            let n = left.min(cap);
            left -= n;
            plan.push(LaunchRequest {
                subnet_id: subnet_id.clone(),
                count: n,
                pause_after: true,
            });
        }
    }
    if let Some(last) = plan.last_mut() {
        last.pause_after = false;
    }
    plan
}

/// The name of the host running the provisioner, used to tag instances.
fn hostname() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Launch `count` instances over the configured subnets, wait for them to run, and record them
/// in fleet order.
pub(crate) async fn create_instances(
    config: &mut FleetConfig,
    clients: &Clients,
    policy: &PollPolicy,
) -> Result<()> {
    ensure!(
        !config.subnet_ids.is_empty(),
        error::ValidationSnafu {
            what: "cannot launch instances without subnets"
        }
    );
    let plan = plan_launch(config.count, &config.subnet_ids, BATCH_CAP);
    let user_data = base64::encode(&config.init_script);
    let security_group_ids = config.launch_security_group_ids();
    let tags = vec![
        (config.tag.clone(), config.tag.clone()),
        ("HOSTNAME".to_string(), hostname()),
    ];
    info!(
        "Launching {} instance(s) in {} request(s)",
        config.count,
        plan.len()
    );

    for request in plan {
        let client_token = Uuid::new_v4().to_string();
        clients
            .cloud
            .run_instances(&RunInstancesRequest {
                client_token: client_token.clone(),
                image_id: config.image_id.clone(),
                instance_type: config.instance_type.clone(),
                key_name: config.key_name.clone(),
                subnet_id: request.subnet_id.clone(),
                security_group_ids: security_group_ids.clone(),
                user_data: user_data.clone(),
                count: request.count,
                tags: tags.clone(),
            })
            .await
            .context(error::RunInstancesSnafu {
                subnet_id: &request.subnet_id,
            })?;
        info!(
            "Requested {} instance(s) in '{}' ({}) with client token '{}'",
            request.count,
            request.subnet_id,
            config
                .subnet_id_to_availability_zone
                .get(&request.subnet_id)
                .map(String::as_str)
                .unwrap_or("unknown zone"),
            client_token
        );
        config.launch_batches.push(LaunchBatch {
            client_token,
            count: request.count,
            subnet_id: request.subnet_id,
        });
        clients.checkpoint_or_warn(config).await;
        if request.pause_after {
            tokio::time::sleep(policy.launch_batch_pause).await;
        }
    }

    reconcile(config, clients, policy).await;

    config.sort_instances();
    info!(
        "Created {} of {} instance(s): {:?}",
        config.instances.len(),
        config.count,
        config.instance_ids()
    );
    clients.checkpoint_or_warn(config).await;
    Ok(())
}

/// Look up each launch batch by client token until every requested instance is running or the
/// deadline passes. Instances are recorded once, however often they are observed. Running out of
/// time is not an error; the fleet proceeds with the instances that are running.
pub(crate) async fn reconcile(config: &mut FleetConfig, clients: &Clients, policy: &PollPolicy) {
    let desired = config.count;
    let deadline = scaled(policy.reconcile_deadline_per_instance, desired);
    let start = Instant::now();
    let batches = config.launch_batches.clone();
    let mut running: HashMap<&str, BTreeSet<String>> = HashMap::new();

    while config.instances.len() < desired && start.elapsed() < deadline {
        let mut satisfied = 0;
        for batch in &batches {
            let seen = running.entry(batch.client_token.as_str()).or_default();
            if seen.len() >= batch.count {
                satisfied += 1;
                continue;
            }
            let observed = match clients
                .cloud
                .describe_instances(InstanceFilter::ClientToken(batch.client_token.clone()))
                .await
            {
                Ok(observed) => observed,
                Err(e) => {
                    warn!("Unable to describe instances: {}", e);
                    tokio::time::sleep(policy.reconcile_interval).await;
                    continue;
                }
            };
            for observed in observed {
                if observed.state != InstanceState::Running {
                    trace!(
                        "Instance '{}' is {:?}",
                        observed.instance.instance_id,
                        observed.state
                    );
                    continue;
                }
                seen.insert(observed.instance.instance_id.clone());
                let instance_id = observed.instance.instance_id.clone();
                let public_ip = observed.instance.public_ip.clone();
                if config.record_instance(observed.instance) {
                    info!("Instance '{}' is running at '{}'", instance_id, public_ip);
                }
            }
            if seen.len() >= batch.count {
                satisfied += 1;
                info!(
                    "Instance group '{}' is ready with {} instance(s)",
                    batch.client_token,
                    seen.len()
                );
            }
            tokio::time::sleep(policy.reconcile_interval).await;
        }
        if satisfied == batches.len() {
            break;
        }
    }

    if config.instances.len() < desired {
        warn!(
            "Only {} of {} instance(s) are running after {:?}, continuing with those",
            config.instances.len(),
            desired,
            start.elapsed()
        );
    }
}

/// Terminate every instance of the fleet and wait for them to be gone. When fewer instances were
/// recorded than launched, the rest are found by client token.
pub(crate) async fn delete_instances(
    config: &mut FleetConfig,
    clients: &Clients,
    policy: &PollPolicy,
) -> Result<()> {
    let mut ids = config.instance_ids();
    let launched: usize = config.launch_batches.iter().map(|batch| batch.count).sum();
    if ids.len() < launched {
        for batch in &config.launch_batches {
            let observed = clients
                .cloud
                .describe_instances(InstanceFilter::ClientToken(batch.client_token.clone()))
                .await
                .context(error::DescribeInstancesSnafu)?;
            for observed in observed {
                let id = observed.instance.instance_id;
                if observed.state != InstanceState::Terminated && !ids.contains(&id) {
                    ids.push(id);
                }
            }
        }
    }
    if ids.is_empty() {
        debug!("No instances to terminate");
        if !config.launch_batches.is_empty() {
            config.clear_instances();
            clients.checkpoint_or_warn(config).await;
        }
        return Ok(());
    }

    info!("Terminating instances {:?}", ids);
    if let Err(e) = clients.cloud.terminate_instances(&ids).await {
        if !e.is_not_found() {
            return Err(e).context(error::TerminateInstancesSnafu);
        }
        warn!("Some instances were already gone: {}", e);
    }

    let settle = scaled(policy.terminate_settle_per_instance, ids.len())
        .min(policy.terminate_settle_cap);
    tokio::time::sleep(settle).await;

    let deadline = scaled(policy.terminate_deadline_per_instance, ids.len());
    let start = Instant::now();
    let mut terminated = BTreeSet::new();
    while terminated.len() < ids.len() && start.elapsed() < deadline {
        let observed = match clients
            .cloud
            .describe_instances(InstanceFilter::Ids(ids.clone()))
            .await
        {
            Ok(observed) => observed,
            Err(e) if e.is_not_found() => {
                debug!("Instances are no longer known: {}", e);
                break;
            }
            Err(e) => return Err(e).context(error::DescribeInstancesSnafu),
        };
        for observed in observed {
            if observed.state == InstanceState::Terminated
                && terminated.insert(observed.instance.instance_id.clone())
            {
                info!("Terminated '{}'", observed.instance.instance_id);
            }
        }
        if terminated.len() < ids.len() {
            tokio::time::sleep(policy.terminate_interval).await;
        }
    }
    if terminated.len() < ids.len() {
        warn!(
            "{} of {} instance(s) were confirmed terminated",
            terminated.len(),
            ids.len()
        );
    }

    config.clear_instances();
    clients.checkpoint_or_warn(config).await;
    Ok(())
}
