/*!

The remote collaborators the provisioner talks to. Each is a trait so that the provisioning logic
can be driven by in-memory implementations in tests. The AWS and SSH backed implementations live
in the submodules.

!*/

mod aws;
mod ec2;
mod error;
mod s3;
mod ssh;

pub use self::aws::aws_config;
pub use self::ec2::Ec2Client;
pub use self::error::{ClientError, ClientResult, IntoClientError};
pub use self::s3::S3Store;
pub use self::ssh::SshConnector;
use fleet_model::{FleetConfig, Instance};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

/// A key pair returned by EC2. `material` is the private key.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct KeyPair {
    pub name: String,
    pub material: String,
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct Subnet {
    pub subnet_id: String,
    pub vpc_id: String,
    pub availability_zone: String,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SubnetFilter {
    /// Every subnet of the VPC.
    Vpc(String),
    /// Exactly these subnets.
    Ids(Vec<String>),
}

/// An inbound firewall rule.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IngressRule {
    pub protocol: String,
    pub from_port: u16,
    pub to_port: u16,
    pub cidr: String,
}

impl IngressRule {
    pub fn tcp_from_anywhere(port: u16) -> Self {
        Self {
            protocol: "tcp".to_string(),
            from_port: port,
            to_port: port,
            cidr: "0.0.0.0/0".to_string(),
        }
    }
}

/// One `RunInstances` call.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RunInstancesRequest {
    pub client_token: String,
    pub image_id: String,
    pub instance_type: String,
    pub key_name: String,
    pub subnet_id: String,
    pub security_group_ids: Vec<String>,
    /// Base64 encoded boot script.
    pub user_data: String,
    pub count: usize,
    pub tags: Vec<(String, String)>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceFilter {
    ClientToken(String),
    Ids(Vec<String>),
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum InstanceState {
    Pending,
    Running,
    ShuttingDown,
    Terminated,
    Stopping,
    Stopped,
    Unknown(String),
}

/// An instance as reported by `DescribeInstances`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ObservedInstance {
    pub instance: Instance,
    pub state: InstanceState,
}

/// The EC2 and STS operations used to build and tear down a fleet.
#[async_trait::async_trait]
pub trait CloudClient: Send + Sync {
    /// The account id of the caller.
    async fn caller_identity(&self) -> ClientResult<String>;

    async fn create_key_pair(&self, key_name: &str) -> ClientResult<KeyPair>;

    async fn delete_key_pair(&self, key_name: &str) -> ClientResult<()>;

    /// Succeeds if the key pair exists. A missing key pair is reported as an error for which
    /// `ClientError::is_not_found` is true.
    async fn describe_key_pair(&self, key_name: &str) -> ClientResult<()>;

    /// Names of the availability zones of the region that are currently available.
    async fn availability_zones(&self) -> ClientResult<Vec<String>>;

    /// Create a VPC with DNS hostnames enabled, returning its id.
    async fn create_vpc(&self, cidr: &str, name: &str) -> ClientResult<String>;

    async fn delete_vpc(&self, vpc_id: &str) -> ClientResult<()>;

    /// Create an internet gateway and attach it to the VPC, returning its id.
    async fn create_internet_gateway(&self, vpc_id: &str) -> ClientResult<String>;

    /// Detach the internet gateway from the VPC and delete it.
    async fn delete_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ClientResult<()>;

    /// Create a route table whose default route points at the internet gateway, returning its id.
    async fn create_route_table(&self, vpc_id: &str, gateway_id: &str) -> ClientResult<String>;

    async fn associate_route_table(&self, route_table_id: &str, subnet_id: &str)
        -> ClientResult<()>;

    async fn delete_route_table(&self, route_table_id: &str) -> ClientResult<()>;

    async fn create_subnet(&self, vpc_id: &str, cidr: &str, zone: &str) -> ClientResult<Subnet>;

    async fn describe_subnets(&self, filter: SubnetFilter) -> ClientResult<Vec<Subnet>>;

    /// Make instances launched into the subnet receive a public address.
    async fn enable_public_ip(&self, subnet_id: &str) -> ClientResult<()>;

    async fn delete_subnet(&self, subnet_id: &str) -> ClientResult<()>;

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> ClientResult<String>;

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> ClientResult<()>;

    async fn delete_security_group(&self, group_id: &str) -> ClientResult<()>;

    async fn run_instances(&self, request: &RunInstancesRequest) -> ClientResult<()>;

    async fn describe_instances(&self, filter: InstanceFilter)
        -> ClientResult<Vec<ObservedInstance>>;

    async fn terminate_instances(&self, instance_ids: &[String]) -> ClientResult<()>;
}

/// How often, and for how long, a remote shell call is attempted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    /// Pause between failed attempts.
    pub interval: Duration,
    /// Limit on a single attempt.
    pub timeout: Duration,
}

/// An open connection to an instance.
#[async_trait::async_trait]
pub trait RemoteShell: Send {
    /// Run `command` and return its stdout.
    async fn run(&mut self, command: &str, retry: RetryPolicy) -> ClientResult<String>;

    async fn send_file(&mut self, local: &Path, remote: &str, retry: RetryPolicy)
        -> ClientResult<()>;

    async fn close(&mut self) -> ClientResult<()>;
}

#[async_trait::async_trait]
pub trait ShellConnector: Send + Sync {
    async fn connect(&self, instance: &Instance) -> ClientResult<Box<dyn RemoteShell>>;
}

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct PutObject {
    pub bucket: String,
    pub key: String,
    pub body: Vec<u8>,
    pub expires: Option<SystemTime>,
    pub metadata: BTreeMap<String, String>,
}

/// The object store that run logs are uploaded to.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    /// Create the bucket. A bucket that already exists is not an error.
    async fn create_bucket(&self, bucket: &str) -> ClientResult<()>;

    async fn tag_bucket(&self, bucket: &str, tags: &[(String, String)]) -> ClientResult<()>;

    async fn put_object(&self, object: PutObject) -> ClientResult<()>;
}

/// Persists the `FleetConfig` after every phase that changes it.
#[async_trait::async_trait]
pub trait Checkpoint: Send + Sync {
    async fn sync(&self, config: &FleetConfig) -> ClientResult<()>;
}

/// Writes the configuration to its `config_path`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileCheckpoint;

#[async_trait::async_trait]
impl Checkpoint for FileCheckpoint {
    async fn sync(&self, config: &FleetConfig) -> ClientResult<()> {
        config.sync().context("Unable to write configuration")
    }
}

/// The collaborators handed to a `Deployer`.
#[derive(Clone)]
pub struct Clients {
    pub cloud: Arc<dyn CloudClient>,
    pub shell: Arc<dyn ShellConnector>,
    /// Only needed when logs are uploaded.
    pub store: Option<Arc<dyn ObjectStore>>,
    pub checkpoint: Arc<dyn Checkpoint>,
}

impl Clients {
    /// Checkpoint between phases. Failures are logged, not returned.
    pub(crate) async fn checkpoint_or_warn(&self, config: &FleetConfig) {
        if let Err(e) = self.checkpoint.sync(config).await {
            log::warn!("Unable to checkpoint configuration: {}", e);
        }
    }
}
