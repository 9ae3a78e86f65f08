use crate::clients::Clients;
use crate::error::{self, Error, Result};
use crate::policy::PollPolicy;
use crate::step::run_step;
use crate::{key_pair, launcher, logs, network, security_group, wait};
use fleet_model::FleetConfig;
use log::{info, warn};
use snafu::{ensure, ResultExt};
use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::Path;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Creates, waits for, and tears down one fleet.
///
/// `create` and `delete` hold the configuration for their whole duration, so they never run at
/// the same time. `stop` may be called from anywhere to interrupt whichever phase is running.
pub struct Deployer {
    config: RwLock<FleetConfig>,
    clients: Clients,
    policy: PollPolicy,
    token: CancellationToken,
}

impl Deployer {
    /// Validate `config`, record the account it will be provisioned in, and checkpoint it.
    pub async fn new(
        mut config: FleetConfig,
        clients: Clients,
        policy: PollPolicy,
    ) -> Result<Self> {
        config
            .validate_and_set_defaults()
            .context(error::ConfigSnafu)?;
        config.aws_account_id = clients
            .cloud
            .caller_identity()
            .await
            .context(error::CallerIdentitySnafu)?;
        info!(
            "Created deployer for '{}' in account '{}' ({})",
            config.id, config.aws_account_id, config.region
        );
        clients
            .checkpoint
            .sync(&config)
            .await
            .context(error::CheckpointSnafu)?;
        Ok(Self {
            config: RwLock::new(config),
            clients,
            policy,
            token: CancellationToken::new(),
        })
    }

    /// Create the key pair, network, security group and instances. If any phase fails, or the
    /// deployer is stopped, everything created so far is deleted again and the original error is
    /// returned.
    pub async fn create(&self) -> Result<()> {
        let mut config = self.config.write().await;
        let start = Instant::now();
        info!("Creating fleet '{}'", config.id);

        let result = self.create_phases(&mut config).await;
        if let Err(e) = &result {
            warn!("Reverting fleet creation: {}", e);
            self.rollback(&mut config).await;
        }
        let synced = self
            .clients
            .checkpoint
            .sync(&config)
            .await
            .context(error::CheckpointSnafu);
        if let Err(e) = result {
            if let Err(sync_error) = synced {
                warn!("{}", sync_error);
            }
            return Err(e);
        }
        synced?;

        info!("Created fleet '{}' in {:?}", config.id, start.elapsed());
        self.upload_logs(&config).await;
        Ok(())
    }

    async fn create_phases(&self, config: &mut FleetConfig) -> Result<()> {
        let token = &self.token;
        let clients = &self.clients;
        let policy = &self.policy;
        run_step(
            token,
            "creating key pair",
            key_pair::create_key_pair(config, clients),
        )
        .await?;
        run_step(
            token,
            "creating network",
            network::create_network(config, clients),
        )
        .await?;
        run_step(
            token,
            "enabling SSH on subnets",
            network::enable_ssh(config, clients),
        )
        .await?;
        run_step(
            token,
            "creating security group",
            security_group::create_security_group(config, clients),
        )
        .await?;
        run_step(
            token,
            "launching instances",
            launcher::create_instances(config, clients, policy),
        )
        .await?;
        Ok(())
    }

    /// Undo a failed `create`. Runs outside of the cancellation token so that a stopped deployer
    /// still cleans up.
    async fn rollback(&self, config: &mut FleetConfig) {
        let clients = &self.clients;
        let policy = &self.policy;
        if let Err(e) = launcher::delete_instances(config, clients, policy).await {
            warn!("Unable to revert instance creation: {}", e);
        }
        if let Err(e) = security_group::delete_security_group(config, clients, policy).await {
            warn!("Unable to revert security group creation: {}", e);
        }
        if config.vpc_created {
            if let Err(e) = network::delete_subnets(config, clients, policy).await {
                warn!("Unable to revert subnet creation: {}", e);
            }
            if let Err(e) = network::delete_vpc(config, clients, policy).await {
                warn!("Unable to revert vpc creation: {}", e);
            }
        }
        if let Err(e) = key_pair::delete_key_pair(config, clients, policy).await {
            warn!("Unable to revert key pair creation: {}", e);
        }
    }

    /// Delete everything the fleet owns. Every delete is attempted; their failures are returned
    /// together as `Error::Teardown`.
    pub async fn delete(&self) -> Result<()> {
        let mut config = self.config.write().await;
        let start = Instant::now();
        info!("Deleting fleet '{}'", config.id);
        let clients = &self.clients;
        let policy = &self.policy;

        let mut messages = Vec::new();
        if let Err(e) = launcher::delete_instances(&mut config, clients, policy).await {
            warn!("Unable to delete instances: {}", e);
            messages.push(e.to_string());
        }
        if let Err(e) = security_group::delete_security_group(&mut config, clients, policy).await {
            warn!("Unable to delete security group: {}", e);
            messages.push(e.to_string());
        }
        if config.vpc_created {
            if let Err(e) = network::delete_subnets(&mut config, clients, policy).await {
                warn!("Unable to delete subnets: {}", e);
                messages.push(e.to_string());
            }
            if let Err(e) = network::delete_vpc(&mut config, clients, policy).await {
                warn!("Unable to delete vpc: {}", e);
                messages.push(e.to_string());
            }
        }
        if let Err(e) = key_pair::delete_key_pair(&config, clients, policy).await {
            warn!("Unable to delete key pair: {}", e);
            messages.push(e.to_string());
        }

        if !messages.is_empty() {
            clients.checkpoint_or_warn(&config).await;
            return Err(Error::Teardown { messages });
        }
        clients
            .checkpoint
            .sync(&config)
            .await
            .context(error::CheckpointSnafu)?;
        info!("Deleted fleet '{}' in {:?}", config.id, start.elapsed());
        self.upload_logs(&config).await;
        Ok(())
    }

    /// Interrupt the running phase. Calling this more than once has no further effect.
    pub fn stop(&self) {
        if !self.token.is_cancelled() {
            info!("Stopping");
        }
        self.token.cancel();
    }

    /// Wait until every instance of the fleet has finished booting.
    pub async fn wait_for_ready(&self) -> Result<()> {
        let instances = self.config.read().await.instance_id_to_instance.clone();
        wait::wait_for_ready(
            instances,
            self.clients.shell.as_ref(),
            &self.policy,
            &self.token,
        )
        .await
    }

    /// Wait until the named instances have finished booting.
    pub async fn wait_for_instances(&self, instance_ids: &[String]) -> Result<()> {
        let instances = {
            let config = self.config.read().await;
            let mut instances = BTreeMap::new();
            for id in instance_ids {
                let instance = config.instance_id_to_instance.get(id).ok_or_else(|| {
                    Error::Validation {
                        what: format!("instance '{}' is not part of the fleet", id),
                    }
                })?;
                instances.insert(id.clone(), instance.clone());
            }
            instances
        };
        wait::wait_for_ready(
            instances,
            self.clients.shell.as_ref(),
            &self.policy,
            &self.token,
        )
        .await
    }

    /// Shell commands for logging in to every instance, in fleet order.
    pub async fn ssh_commands(&self) -> String {
        ssh_commands(&*self.config.read().await)
    }

    /// Copy `local` to `remote` on every instance of the fleet.
    pub async fn send_file_to_all(&self, local: &Path, remote: &str) -> Result<()> {
        tokio::fs::metadata(local)
            .await
            .context(error::ReadFileSnafu { path: local })?;
        let instances = self.config.read().await.instances.clone();
        ensure!(
            !instances.is_empty(),
            error::ValidationSnafu {
                what: "the fleet has no instances"
            }
        );
        let shell = &self.clients.shell;
        let retry = self.policy.shell_retry;
        run_step(&self.token, "sending file", async move {
            let mut messages = Vec::new();
            for instance in &instances {
                let id = &instance.instance_id;
                let shell_error = |source| {
                    Error::Shell {
                        instance_id: id.clone(),
                        source,
                    }
                    .to_string()
                };
                let mut remote_shell = match shell.connect(instance).await {
                    Ok(remote_shell) => remote_shell,
                    Err(e) => {
                        messages.push(shell_error(e));
                        continue;
                    }
                };
                match remote_shell.send_file(local, remote, retry).await {
                    Ok(()) => info!("Sent '{}' to '{}:{}'", local.display(), id, remote),
                    Err(e) => messages.push(shell_error(e)),
                }
                if let Err(e) = remote_shell.close().await {
                    warn!("Unable to close the session to '{}': {}", id, e);
                }
            }
            if messages.is_empty() {
                Ok(())
            } else {
                Err(Error::SendFile { messages })
            }
        })
        .await
    }

    /// A copy of the current configuration.
    pub async fn config(&self) -> FleetConfig {
        self.config.read().await.clone()
    }

    async fn upload_logs(&self, config: &FleetConfig) {
        if !config.upload_logs {
            return;
        }
        match &self.clients.store {
            Some(store) => {
                if let Err(e) = logs::upload_run_logs(config, store.as_ref()).await {
                    warn!("Unable to upload logs: {}", e);
                }
            }
            None => warn!("Not uploading logs, no object store is configured"),
        }
    }
}

/// Render the SSH commands for `config`: a `chmod` of the private key followed by one `ssh` line
/// per instance.
pub fn ssh_commands(config: &FleetConfig) -> String {
    let key_path = config.key_path.display();
    let mut commands = format!("\n\n# change SSH key permission\nchmod 400 {}\n\n", key_path);
    for instance in &config.instances {
        let host = if instance.public_dns_name.is_empty() {
            instance.ssh_address()
        } else {
            instance.public_dns_name.as_str()
        };
        let _ = writeln!(
            commands,
            "ssh -o \"StrictHostKeyChecking no\" -i {} {}@{}",
            key_path, config.user_name, host
        );
    }
    commands
}

#[cfg(test)]
mod test {
    use super::ssh_commands;
    use fleet_model::{FleetConfig, Instance};

    #[test]
    fn ssh_commands_follow_fleet_order() {
        let mut config = FleetConfig::default_for("/tmp/fleet.yaml");
        config.key_path = "/tmp/fleet.pem".into();
        config.user_name = "ec2-user".to_string();
        config.record_instance(Instance {
            instance_id: "i-1".to_string(),
            public_dns_name: "ec2-1.compute.amazonaws.com".to_string(),
            ..Instance::default()
        });
        config.record_instance(Instance {
            instance_id: "i-2".to_string(),
            public_ip: "54.0.0.2".to_string(),
            ..Instance::default()
        });
        let ssh = "ssh -o \"StrictHostKeyChecking no\" -i /tmp/fleet.pem ec2-user@";
        assert_eq!(
            ssh_commands(&config),
            format!(
                "\n\n# change SSH key permission\nchmod 400 /tmp/fleet.pem\n\n\
                 {ssh}ec2-1.compute.amazonaws.com\n{ssh}54.0.0.2\n",
                ssh = ssh
            )
        );
    }
}
