use serde::{Deserialize, Serialize};

/// An EC2 instance that reached the `running` state and was recorded in the fleet.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub instance_id: String,
    #[serde(default)]
    pub public_ip: String,
    #[serde(default)]
    pub public_dns_name: String,
    #[serde(default)]
    pub private_ip: String,
    #[serde(default)]
    pub subnet_id: String,
    #[serde(default)]
    pub availability_zone: String,
    /// Launch time in seconds since the unix epoch, as reported by EC2.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub launch_time: Option<i64>,
    /// Position of the instance in fleet order once the fleet has been sorted.
    #[serde(default)]
    pub launch_sequence: usize,
}

impl Instance {
    /// The address used to reach the instance over SSH. Falls back to the public DNS name when EC2
    /// did not assign a public IP.
    pub fn ssh_address(&self) -> &str {
        if self.public_ip.is_empty() {
            &self.public_dns_name
        } else {
            &self.public_ip
        }
    }
}

/// A single `RunInstances` request, identified by its client token, and the number of instances
/// it asked for.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchBatch {
    pub client_token: String,
    pub count: usize,
    #[serde(default)]
    pub subnet_id: String,
}
