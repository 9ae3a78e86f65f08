use crate::constants::{
    DEFAULT_COUNT, DEFAULT_INGRESS_PORTS, DEFAULT_INIT_SCRIPT, DEFAULT_INSTANCE_TYPE,
    DEFAULT_REGION, DEFAULT_USER_NAME, DEFAULT_VPC_CIDR,
};
use crate::error::{self, Result};
use crate::instance::{Instance, LaunchBatch};
use chrono::Utc;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Everything a single provisioning run needs, and everything it has created so far.
///
/// The provisioner mutates this in place after each phase and checkpoints it, so a run that dies
/// half way through leaves enough behind for `delete` to find every resource it owns.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct FleetConfig {
    /// Unique name of this fleet. Used to name the key pair, security group and client tokens.
    pub id: String,
    pub region: String,
    /// Where this configuration is persisted.
    pub config_path: PathBuf,
    /// Filled from the caller identity when the deployer starts.
    pub aws_account_id: String,

    pub log_level: String,
    /// A file copy of the run log that is uploaded along with the configuration.
    pub log_output_path: Option<PathBuf>,
    pub upload_logs: bool,
    pub log_bucket: String,

    pub key_name: String,
    pub key_path: PathBuf,
    /// The login user for SSH.
    pub user_name: String,

    /// The desired number of instances.
    pub count: usize,
    pub image_id: String,
    pub instance_type: String,
    /// Boot script passed to the instances as user data.
    pub init_script: String,
    pub tag: String,
    /// Wait for every instance's boot script to finish after creation.
    pub wait: bool,

    pub vpc_cidr: String,
    /// An existing VPC to launch into. Empty means a new one is created.
    pub vpc_id: String,
    /// True if and only if this run created the VPC. Decides whether `delete` removes the VPC,
    /// its subnets, internet gateway and route table.
    pub vpc_created: bool,
    pub internet_gateway_id: Option<String>,
    pub route_table_id: Option<String>,
    pub subnet_ids: Vec<String>,
    pub subnet_id_to_availability_zone: BTreeMap<String, String>,

    /// Inbound TCP ports opened by the security group this run creates.
    pub ingress_ports: Vec<u16>,
    /// Every security group attached to the instances.
    pub security_group_ids: Vec<String>,
    /// The security group created by this run, if any.
    pub security_group_id: Option<String>,

    /// Accepted `RunInstances` requests, recorded so that instances can be found by client token.
    pub launch_batches: Vec<LaunchBatch>,
    /// Fleet order.
    pub instances: Vec<Instance>,
    /// Fleet index. Holds exactly the ids in `instances`.
    pub instance_id_to_instance: BTreeMap<String, Instance>,
}

impl FleetConfig {
    /// Create a configuration with default values that will be persisted at `path`.
    pub fn default_for<P: AsRef<Path>>(path: P) -> Self {
        let id = format!(
            "ec2-fleet-{}-{}",
            Utc::now().format("%Y%m%d%H"),
            &Uuid::new_v4().simple().to_string()[..8]
        );
        Self {
            key_name: id.clone(),
            tag: id.clone(),
            id,
            region: DEFAULT_REGION.to_string(),
            config_path: path.as_ref().to_path_buf(),
            log_level: "info".to_string(),
            user_name: DEFAULT_USER_NAME.to_string(),
            count: DEFAULT_COUNT,
            instance_type: DEFAULT_INSTANCE_TYPE.to_string(),
            init_script: DEFAULT_INIT_SCRIPT.to_string(),
            vpc_cidr: DEFAULT_VPC_CIDR.to_string(),
            ingress_ports: DEFAULT_INGRESS_PORTS.to_vec(),
            ..Self::default()
        }
    }

    /// Read a configuration from `path`. The returned configuration will be persisted back to the
    /// same `path`.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).context(error::ReadSnafu { path })?;
        let mut config: Self =
            serde_yaml::from_str(&data).context(error::DeserializeSnafu { path })?;
        config.config_path = path.to_path_buf();
        Ok(config)
    }

    /// Fill in defaults for unset fields and reject configurations that cannot be provisioned.
    /// Nothing remote has been touched when this fails.
    pub fn validate_and_set_defaults(&mut self) -> Result<()> {
        if self.count == 0 {
            return invalid("instance count must be greater than zero");
        }
        if self.image_id.is_empty() {
            return invalid("image id is required");
        }
        if self.instance_type.is_empty() {
            return invalid("instance type is required");
        }
        if !self.subnet_ids.is_empty() && self.vpc_id.is_empty() {
            return invalid("subnet ids were given without the vpc id they belong to");
        }
        if self.vpc_created && self.vpc_id.is_empty() {
            return invalid("configuration claims a created vpc but has no vpc id");
        }
        self.check_fleet_consistency()?;

        if self.id.is_empty() {
            self.id = Self::default_for(&self.config_path).id;
        }
        if self.region.is_empty() {
            self.region = DEFAULT_REGION.to_string();
        }
        if self.key_name.is_empty() {
            self.key_name = self.id.clone();
        }
        if self.key_path.as_os_str().is_empty() {
            self.key_path = match self.config_path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.join(format!("{}.pem", self.id)),
                _ => std::env::temp_dir().join(format!("{}.pem", self.id)),
            };
        }
        if self.user_name.is_empty() {
            self.user_name = DEFAULT_USER_NAME.to_string();
        }
        if self.tag.is_empty() {
            self.tag = self.id.clone();
        }
        if self.vpc_cidr.is_empty() {
            self.vpc_cidr = DEFAULT_VPC_CIDR.to_string();
        }
        if self.ingress_ports.is_empty() {
            self.ingress_ports = DEFAULT_INGRESS_PORTS.to_vec();
        }
        if self.init_script.is_empty() {
            self.init_script = DEFAULT_INIT_SCRIPT.to_string();
        }
        if self.upload_logs && self.log_bucket.is_empty() {
            // Bucket names must be lower case.
            self.log_bucket = format!("{}-logs", self.id.to_lowercase());
        }
        Ok(())
    }

    /// Persist the configuration to `config_path`. The file is replaced atomically so that a
    /// crash never leaves a truncated configuration behind.
    pub fn sync(&self) -> Result<()> {
        if self.config_path.as_os_str().is_empty() {
            return Err(error::ConfigPathMissingSnafu.build().into());
        }
        let data = serde_yaml::to_string(self).context(error::SerializeSnafu)?;
        let mut tmp = self.config_path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, data).context(error::WriteSnafu { path: &tmp })?;
        fs::rename(&tmp, &self.config_path).context(error::WriteSnafu {
            path: &self.config_path,
        })?;
        debug!("Synced configuration to '{}'", self.config_path.display());
        Ok(())
    }

    /// Copy the persisted configuration next to itself with a timestamp suffix, returning the path
    /// of the copy.
    pub fn backup(&self) -> Result<PathBuf> {
        let mut backup = self.config_path.clone().into_os_string();
        backup.push(format!(".backup.{}", Utc::now().format("%Y%m%d%H%M%S")));
        let backup = PathBuf::from(backup);
        fs::copy(&self.config_path, &backup).context(error::BackupSnafu { path: &backup })?;
        info!("Backed up configuration to '{}'", backup.display());
        Ok(backup)
    }

    /// Record a running instance in both fleet order and the fleet index. Returns `false`, and
    /// changes nothing, if the instance is already recorded.
    pub fn record_instance(&mut self, instance: Instance) -> bool {
        if self
            .instance_id_to_instance
            .contains_key(&instance.instance_id)
        {
            return false;
        }
        self.instance_id_to_instance
            .insert(instance.instance_id.clone(), instance.clone());
        self.instances.push(instance);
        true
    }

    /// Sort fleet order by launch time, breaking ties with the instance id, then number the
    /// instances and rebuild the fleet index from the sorted order.
    pub fn sort_instances(&mut self) {
        self.instances.sort_by(|a, b| {
            a.launch_time
                .cmp(&b.launch_time)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        self.instance_id_to_instance.clear();
        for (sequence, instance) in self.instances.iter_mut().enumerate() {
            instance.launch_sequence = sequence;
            self.instance_id_to_instance
                .insert(instance.instance_id.clone(), instance.clone());
        }
    }

    /// Forget every instance and launch batch.
    pub fn clear_instances(&mut self) {
        self.instances.clear();
        self.instance_id_to_instance.clear();
        self.launch_batches.clear();
    }

    pub fn instance_ids(&self) -> Vec<String> {
        self.instances
            .iter()
            .map(|instance| instance.instance_id.clone())
            .collect()
    }

    /// Every security group id that should be attached to launched instances.
    pub fn launch_security_group_ids(&self) -> Vec<String> {
        let mut ids = self.security_group_ids.clone();
        if let Some(created) = &self.security_group_id {
            if !ids.contains(created) {
                ids.push(created.clone());
            }
        }
        ids
    }

    /// Ensure every id in fleet order appears exactly once and matches the fleet index.
    pub fn check_fleet_consistency(&self) -> Result<()> {
        if self.instances.len() != self.instance_id_to_instance.len() {
            return Err(error::InconsistentFleetSnafu {
                reason: format!(
                    "{} instances in fleet order but {} in the fleet index",
                    self.instances.len(),
                    self.instance_id_to_instance.len()
                ),
            }
            .build()
            .into());
        }
        for instance in &self.instances {
            if !self
                .instance_id_to_instance
                .contains_key(&instance.instance_id)
            {
                return Err(error::InconsistentFleetSnafu {
                    reason: format!(
                        "instance '{}' is missing from the fleet index",
                        instance.instance_id
                    ),
                }
                .build()
                .into());
            }
        }
        Ok(())
    }
}

fn invalid<T>(reason: &str) -> Result<T> {
    Err(error::InvalidSnafu { reason }.build().into())
}
