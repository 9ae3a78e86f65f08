//! Environment variable overrides for `FleetConfig`, described by one declarative table.

use crate::constants::{DEFAULT_INSTANCE_TYPE, DEFAULT_REGION, DEFAULT_USER_NAME, ENV_PREFIX};
use crate::error::{self, Result};
use crate::fleet::FleetConfig;
use log::info;
use std::fmt::Write;
use std::path::PathBuf;

/// A `FleetConfig` field that can be set from the environment.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum Field {
    Region,
    Count,
    ImageId,
    InstanceType,
    KeyName,
    KeyPath,
    UserName,
    Tag,
    VpcId,
    VpcCidr,
    SubnetIds,
    SecurityGroupIds,
    IngressPorts,
    Wait,
    UploadLogs,
    LogBucket,
    LogLevel,
    LogOutputPath,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FieldKind {
    String,
    Integer,
    Bool,
    /// Comma separated values.
    List,
}

/// One row of the override table.
#[derive(Copy, Clone, Debug)]
pub struct EnvField {
    pub field: Field,
    /// The environment variable name, without `ENV_PREFIX`.
    pub env: &'static str,
    pub kind: FieldKind,
    pub default: &'static str,
    /// Whether an empty string, empty list or `0` is an acceptable value.
    pub zero_allowed: bool,
    pub description: &'static str,
}

pub const FIELDS: &[EnvField] = &[
    EnvField {
        field: Field::Region,
        env: "REGION",
        kind: FieldKind::String,
        default: DEFAULT_REGION,
        zero_allowed: false,
        description: "AWS region to provision in",
    },
    EnvField {
        field: Field::Count,
        env: "COUNT",
        kind: FieldKind::Integer,
        default: "1",
        zero_allowed: false,
        description: "number of instances to launch",
    },
    EnvField {
        field: Field::ImageId,
        env: "IMAGE_ID",
        kind: FieldKind::String,
        default: "",
        zero_allowed: false,
        description: "machine image id",
    },
    EnvField {
        field: Field::InstanceType,
        env: "INSTANCE_TYPE",
        kind: FieldKind::String,
        default: DEFAULT_INSTANCE_TYPE,
        zero_allowed: false,
        description: "EC2 instance type",
    },
    EnvField {
        field: Field::KeyName,
        env: "KEY_NAME",
        kind: FieldKind::String,
        default: "<fleet id>",
        zero_allowed: false,
        description: "name of the key pair to create",
    },
    EnvField {
        field: Field::KeyPath,
        env: "KEY_PATH",
        kind: FieldKind::String,
        default: "<config dir>/<fleet id>.pem",
        zero_allowed: false,
        description: "where the private key is written",
    },
    EnvField {
        field: Field::UserName,
        env: "USER_NAME",
        kind: FieldKind::String,
        default: DEFAULT_USER_NAME,
        zero_allowed: false,
        description: "SSH login user",
    },
    EnvField {
        field: Field::Tag,
        env: "TAG",
        kind: FieldKind::String,
        default: "<fleet id>",
        zero_allowed: false,
        description: "tag key and value applied to instances",
    },
    EnvField {
        field: Field::VpcId,
        env: "VPC_ID",
        kind: FieldKind::String,
        default: "",
        zero_allowed: true,
        description: "existing VPC to launch into, empty to create one",
    },
    EnvField {
        field: Field::VpcCidr,
        env: "VPC_CIDR",
        kind: FieldKind::String,
        default: crate::constants::DEFAULT_VPC_CIDR,
        zero_allowed: false,
        description: "CIDR block of a created VPC",
    },
    EnvField {
        field: Field::SubnetIds,
        env: "SUBNET_IDS",
        kind: FieldKind::List,
        default: "",
        zero_allowed: true,
        description: "subnets of the existing VPC, empty to discover them",
    },
    EnvField {
        field: Field::SecurityGroupIds,
        env: "SECURITY_GROUP_IDS",
        kind: FieldKind::List,
        default: "",
        zero_allowed: true,
        description: "additional security groups attached to instances",
    },
    EnvField {
        field: Field::IngressPorts,
        env: "INGRESS_PORTS",
        kind: FieldKind::List,
        default: "22",
        zero_allowed: false,
        description: "inbound TCP ports opened by the created security group",
    },
    EnvField {
        field: Field::Wait,
        env: "WAIT",
        kind: FieldKind::Bool,
        default: "false",
        zero_allowed: true,
        description: "wait for boot scripts to finish after creation",
    },
    EnvField {
        field: Field::UploadLogs,
        env: "UPLOAD_LOGS",
        kind: FieldKind::Bool,
        default: "false",
        zero_allowed: true,
        description: "upload configuration, logs and key to S3",
    },
    EnvField {
        field: Field::LogBucket,
        env: "LOG_BUCKET",
        kind: FieldKind::String,
        default: "<fleet id>-logs",
        zero_allowed: true,
        description: "S3 bucket for uploaded logs",
    },
    EnvField {
        field: Field::LogLevel,
        env: "LOG_LEVEL",
        kind: FieldKind::String,
        default: "info",
        zero_allowed: false,
        description: "log level used when neither --log-level nor RUST_LOG is given",
    },
    EnvField {
        field: Field::LogOutputPath,
        env: "LOG_OUTPUT_PATH",
        kind: FieldKind::String,
        default: "",
        zero_allowed: false,
        description: "file that receives a copy of the run log",
    },
];

impl EnvField {
    /// The full environment variable name.
    pub fn var_name(&self) -> String {
        format!("{}{}", ENV_PREFIX, self.env)
    }

    fn apply(&self, config: &mut FleetConfig, value: &str) -> Result<()> {
        let value = value.trim();
        match self.kind {
            FieldKind::String => {
                self.check_zero(value, value.is_empty())?;
                self.set_string(config, value);
            }
            FieldKind::Integer => {
                let parsed: usize = value
                    .parse()
                    .map_err(|_| self.error(value, "not an integer"))?;
                self.check_zero(value, parsed == 0)?;
                if self.field == Field::Count {
                    config.count = parsed;
                }
            }
            FieldKind::Bool => {
                let parsed: bool = value
                    .parse()
                    .map_err(|_| self.error(value, "expected 'true' or 'false'"))?;
                match self.field {
                    Field::Wait => config.wait = parsed,
                    Field::UploadLogs => config.upload_logs = parsed,
                    _ => {}
                }
            }
            FieldKind::List => {
                let items: Vec<String> = value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(String::from)
                    .collect();
                self.check_zero(value, items.is_empty())?;
                match self.field {
                    Field::SubnetIds => config.subnet_ids = items,
                    Field::SecurityGroupIds => config.security_group_ids = items,
                    Field::IngressPorts => {
                        config.ingress_ports = items
                            .iter()
                            .map(|port| port.parse::<u16>())
                            .collect::<std::result::Result<_, _>>()
                            .map_err(|_| self.error(value, "not a list of ports"))?;
                    }
                    _ => {}
                }
            }
        }
        Ok(())
    }

    fn set_string(&self, config: &mut FleetConfig, value: &str) {
        let value = value.to_string();
        match self.field {
            Field::Region => config.region = value,
            Field::ImageId => config.image_id = value,
            Field::InstanceType => config.instance_type = value,
            Field::KeyName => config.key_name = value,
            Field::KeyPath => config.key_path = PathBuf::from(value),
            Field::UserName => config.user_name = value,
            Field::Tag => config.tag = value,
            Field::VpcId => config.vpc_id = value,
            Field::VpcCidr => config.vpc_cidr = value,
            Field::LogBucket => config.log_bucket = value,
            Field::LogLevel => config.log_level = value,
            Field::LogOutputPath => config.log_output_path = Some(PathBuf::from(value)),
            _ => {}
        }
    }

    fn check_zero(&self, value: &str, is_zero: bool) -> Result<()> {
        if is_zero && !self.zero_allowed {
            return Err(self.error(value, "an empty or zero value is not allowed"));
        }
        Ok(())
    }

    fn error(&self, value: &str, reason: &str) -> crate::Error {
        error::EnvValueSnafu {
            env: self.var_name(),
            value,
            reason,
        }
        .build()
        .into()
    }
}

impl FleetConfig {
    /// Override fields from `FLEET_*` environment variables. Returns the names of the variables
    /// that were applied.
    pub fn apply_env_overrides(&mut self) -> Result<Vec<String>> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Override fields using `lookup` to resolve variable names to values.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<Vec<String>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut applied = Vec::new();
        for field in FIELDS {
            let name = field.var_name();
            if let Some(value) = lookup(&name) {
                field.apply(self, &value)?;
                info!("Applied '{}' from the environment", name);
                applied.push(name);
            }
        }
        Ok(applied)
    }
}

/// Render a help table of every supported environment variable.
pub fn render_env_help() -> String {
    let mut out = String::new();
    for field in FIELDS {
        let kind = match field.kind {
            FieldKind::String => "string",
            FieldKind::Integer => "integer",
            FieldKind::Bool => "bool",
            FieldKind::List => "list",
        };
        let _ = writeln!(
            out,
            "{:<28} {:<8} {} (default: '{}'{})",
            field.var_name(),
            kind,
            field.description,
            field.default,
            if field.zero_allowed { ", may be empty" } else { "" }
        );
    }
    out
}
