pub const DEFAULT_REGION: &str = "us-west-2";
pub const DEFAULT_INSTANCE_TYPE: &str = "m5.xlarge";
pub const DEFAULT_COUNT: usize = 1;
pub const DEFAULT_USER_NAME: &str = "ec2-user";
pub const DEFAULT_VPC_CIDR: &str = "192.168.0.0/16";
pub const DEFAULT_INGRESS_PORTS: &[u16] = &[22];

/// Prefix of every environment variable that overrides a `FleetConfig` field.
pub const ENV_PREFIX: &str = "FLEET_";

/// Printed by the boot script once every plugin has been installed. Matched verbatim against the
/// tail of the cloud-init output log.
pub const READY_SENTINEL: &str = "AWS_K8S_TESTER_EC2_PLUGIN_READY";

/// The boot script used when none is configured.
pub const DEFAULT_INIT_SCRIPT: &str = r#"#!/usr/bin/env bash
set -e

echo "AWS_K8S_TESTER_EC2_PLUGIN_READY"
"#;
