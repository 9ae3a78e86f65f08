use crate::clients::ClientError;
use snafu::Snafu;
use std::path::PathBuf;

/// The result type returned by provisioning operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid configuration: {}", what))]
    Validation { what: String },

    #[snafu(display("Invalid configuration: {}", source))]
    Config { source: fleet_model::Error },

    #[snafu(display("Unable to get caller identity: {}", source))]
    CallerIdentity { source: ClientError },

    #[snafu(display("Unable to checkpoint configuration: {}", source))]
    Checkpoint { source: ClientError },

    #[snafu(display("Unable to create key pair '{}': {}", key_name, source))]
    CreateKeyPair {
        key_name: String,
        source: ClientError,
    },

    #[snafu(display(
        "Requested key pair '{}' but EC2 returned '{}'",
        requested,
        returned
    ))]
    KeyNameMismatch { requested: String, returned: String },

    #[snafu(display("Unable to write private key to '{}': {}", path.display(), source))]
    WriteKey {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to delete key pair '{}': {}", key_name, source))]
    DeleteKeyPair {
        key_name: String,
        source: ClientError,
    },

    #[snafu(display("Unable to describe key pair '{}': {}", key_name, source))]
    DescribeKeyPair {
        key_name: String,
        source: ClientError,
    },

    #[snafu(display("deleted key pair but '{}' still exists", key_name))]
    KeyPairStillExists { key_name: String },

    #[snafu(display("Unable to list availability zones: {}", source))]
    AvailabilityZones { source: ClientError },

    #[snafu(display("Unable to create vpc: {}", source))]
    CreateVpc { source: ClientError },

    #[snafu(display("Unable to create internet gateway: {}", source))]
    CreateInternetGateway { source: ClientError },

    #[snafu(display("Unable to create route table: {}", source))]
    CreateRouteTable { source: ClientError },

    #[snafu(display("Unable to create subnet '{}': {}", cidr, source))]
    CreateSubnet { cidr: String, source: ClientError },

    #[snafu(display("Unable to associate route table with '{}': {}", subnet_id, source))]
    AssociateRouteTable {
        subnet_id: String,
        source: ClientError,
    },

    #[snafu(display("Unable to describe subnets: {}", source))]
    DescribeSubnets { source: ClientError },

    #[snafu(display("Unable to enable public ips on '{}': {}", subnet_id, source))]
    EnablePublicIp {
        subnet_id: String,
        source: ClientError,
    },

    #[snafu(display("Unable to delete {} '{}': {}", what, id, source))]
    DeleteNetwork {
        what: String,
        id: String,
        source: ClientError,
    },

    #[snafu(display("Unable to create security group '{}': {}", name, source))]
    CreateSecurityGroup { name: String, source: ClientError },

    #[snafu(display("Unable to authorize ingress on '{}': {}", group_id, source))]
    AuthorizeIngress {
        group_id: String,
        source: ClientError,
    },

    #[snafu(display("Unable to delete security group '{}': {}", group_id, source))]
    DeleteSecurityGroup {
        group_id: String,
        source: ClientError,
    },

    #[snafu(display("Unable to run instances in '{}': {}", subnet_id, source))]
    RunInstances {
        subnet_id: String,
        source: ClientError,
    },

    #[snafu(display("Unable to describe instances: {}", source))]
    DescribeInstances { source: ClientError },

    #[snafu(display("Unable to terminate instances: {}", source))]
    TerminateInstances { source: ClientError },

    #[snafu(display("{}", messages.join(", ")))]
    Teardown { messages: Vec<String> },

    #[snafu(display("Remote shell error on '{}': {}", instance_id, source))]
    Shell {
        instance_id: String,
        source: ClientError,
    },

    #[snafu(display("Unable to send file to instances: {}", messages.join(", ")))]
    SendFile { messages: Vec<String> },

    #[snafu(display("Unable to read '{}': {}", path.display(), source))]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Unable to upload logs to '{}': {}", bucket, source))]
    UploadLogs { bucket: String, source: ClientError },

    #[snafu(display("Interrupted while {}", step))]
    Interrupted { step: String },

    #[snafu(display(
        "Interrupted while waiting for instances [{}]",
        pending.join(", ")
    ))]
    WaitInterrupted { pending: Vec<String> },

    #[snafu(display(
        "Timed out waiting for instances [{}]",
        pending.join(", ")
    ))]
    WaitTimeout { pending: Vec<String> },
}

impl Error {
    /// True when the operation was stopped by `Deployer::stop` rather than failing.
    pub fn is_interrupted(&self) -> bool {
        matches!(
            self,
            Error::Interrupted { .. } | Error::WaitInterrupted { .. }
        )
    }
}

#[cfg(test)]
mod test {
    use super::Error;

    #[test]
    fn teardown_joins_messages() {
        let err = Error::Teardown {
            messages: vec![
                "Unable to terminate instances".to_string(),
                "deleted key pair but 'fleet' still exists".to_string(),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Unable to terminate instances, deleted key pair but 'fleet' still exists"
        );
        assert!(!err.is_interrupted());
    }

    #[test]
    fn interrupted_variants() {
        assert!(Error::Interrupted {
            step: "creating key pair".to_string()
        }
        .is_interrupted());
        assert!(Error::WaitInterrupted { pending: vec![] }.is_interrupted());
        assert!(!Error::WaitTimeout { pending: vec![] }.is_interrupted());
    }
}
