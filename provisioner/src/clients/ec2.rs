use super::aws::sdk_error;
use super::error::{ClientError, ClientResult, IntoClientError};
use super::{
    CloudClient, IngressRule, InstanceFilter, InstanceState, KeyPair, ObservedInstance,
    RunInstancesRequest, Subnet, SubnetFilter,
};
use aws_sdk_ec2::model::{
    AttributeBooleanValue, Filter, InstanceStateName, InstanceType, IpPermission, IpRange,
    ResourceType, ShutdownBehavior, Tag, TagSpecification,
};
use aws_types::SdkConfig;
use fleet_model::Instance;
use log::{debug, trace};

/// A `CloudClient` backed by the EC2 and STS APIs.
#[derive(Clone, Debug)]
pub struct Ec2Client {
    ec2: aws_sdk_ec2::Client,
    sts: aws_sdk_sts::Client,
}

impl Ec2Client {
    pub fn new(config: &SdkConfig) -> Self {
        Self {
            ec2: aws_sdk_ec2::Client::new(config),
            sts: aws_sdk_sts::Client::new(config),
        }
    }
}

fn name_tag(resource_type: ResourceType, name: &str) -> TagSpecification {
    TagSpecification::builder()
        .resource_type(resource_type)
        .tags(Tag::builder().key("Name").value(name).build())
        .build()
}

fn to_i32(value: usize, what: &str) -> ClientResult<i32> {
    i32::try_from(value).context(format!("{} '{}' is out of range", what, value))
}

fn observed(instance: &aws_sdk_ec2::model::Instance) -> ClientResult<ObservedInstance> {
    let instance_id = instance
        .instance_id()
        .context("Instance missing instance_id field")?
        .to_string();
    let state = match instance.state().and_then(|state| state.name()) {
        Some(InstanceStateName::Pending) => InstanceState::Pending,
        Some(InstanceStateName::Running) => InstanceState::Running,
        Some(InstanceStateName::ShuttingDown) => InstanceState::ShuttingDown,
        Some(InstanceStateName::Terminated) => InstanceState::Terminated,
        Some(InstanceStateName::Stopping) => InstanceState::Stopping,
        Some(InstanceStateName::Stopped) => InstanceState::Stopped,
        Some(other) => InstanceState::Unknown(other.as_str().to_string()),
        None => InstanceState::Unknown(String::new()),
    };
    Ok(ObservedInstance {
        instance: Instance {
            instance_id,
            public_ip: instance.public_ip_address().unwrap_or_default().to_string(),
            public_dns_name: instance.public_dns_name().unwrap_or_default().to_string(),
            private_ip: instance.private_ip_address().unwrap_or_default().to_string(),
            subnet_id: instance.subnet_id().unwrap_or_default().to_string(),
            availability_zone: instance
                .placement()
                .and_then(|placement| placement.availability_zone())
                .unwrap_or_default()
                .to_string(),
            launch_time: instance.launch_time().map(|time| time.secs()),
            launch_sequence: 0,
        },
        state,
    })
}

fn subnet(subnet: &aws_sdk_ec2::model::Subnet) -> ClientResult<Subnet> {
    Ok(Subnet {
        subnet_id: subnet
            .subnet_id()
            .context("Subnet missing subnet_id field")?
            .to_string(),
        vpc_id: subnet.vpc_id().unwrap_or_default().to_string(),
        availability_zone: subnet
            .availability_zone()
            .context("Subnet missing availability_zone field")?
            .to_string(),
    })
}

#[async_trait::async_trait]
impl CloudClient for Ec2Client {
    async fn caller_identity(&self) -> ClientResult<String> {
        let output = self
            .sts
            .get_caller_identity()
            .send()
            .await
            .context("Unable to get caller identity")?;
        Ok(output
            .account()
            .context("Caller identity missing account field")?
            .to_string())
    }

    async fn create_key_pair(&self, key_name: &str) -> ClientResult<KeyPair> {
        let output = self
            .ec2
            .create_key_pair()
            .key_name(key_name)
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to create key pair '{}'", key_name), e))?;
        Ok(KeyPair {
            name: output
                .key_name()
                .context("Key pair missing key_name field")?
                .to_string(),
            material: output
                .key_material()
                .context("Key pair missing key_material field")?
                .to_string(),
        })
    }

    async fn delete_key_pair(&self, key_name: &str) -> ClientResult<()> {
        self.ec2
            .delete_key_pair()
            .key_name(key_name)
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to delete key pair '{}'", key_name), e))?;
        Ok(())
    }

    async fn describe_key_pair(&self, key_name: &str) -> ClientResult<()> {
        let output = self
            .ec2
            .describe_key_pairs()
            .key_names(key_name)
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to describe key pair '{}'", key_name), e))?;
        let found = output
            .key_pairs()
            .unwrap_or_default()
            .iter()
            .any(|key_pair| key_pair.key_name() == Some(key_name));
        if found {
            Ok(())
        } else {
            Err(
                ClientError::new_with_context(format!("Key pair '{}' not found", key_name))
                    .with_code(Some("InvalidKeyPair.NotFound")),
            )
        }
    }

    async fn availability_zones(&self) -> ClientResult<Vec<String>> {
        let output = self
            .ec2
            .describe_availability_zones()
            .filters(Filter::builder().name("state").values("available").build())
            .send()
            .await
            .map_err(|e| sdk_error("Unable to describe availability zones", e))?;
        let mut zones: Vec<String> = output
            .availability_zones()
            .unwrap_or_default()
            .iter()
            .filter_map(|zone| zone.zone_name().map(str::to_string))
            .collect();
        zones.sort();
        Ok(zones)
    }

    async fn create_vpc(&self, cidr: &str, name: &str) -> ClientResult<String> {
        let output = self
            .ec2
            .create_vpc()
            .cidr_block(cidr)
            .tag_specifications(name_tag(ResourceType::Vpc, name))
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to create vpc '{}'", cidr), e))?;
        let vpc_id = output
            .vpc()
            .and_then(|vpc| vpc.vpc_id())
            .context("Vpc missing vpc_id field")?
            .to_string();
        // Instances need public DNS names for the SSH helpers.
        self.ec2
            .modify_vpc_attribute()
            .vpc_id(&vpc_id)
            .enable_dns_hostnames(AttributeBooleanValue::builder().value(true).build())
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to enable dns hostnames on '{}'", vpc_id), e))?;
        Ok(vpc_id)
    }

    async fn delete_vpc(&self, vpc_id: &str) -> ClientResult<()> {
        self.ec2
            .delete_vpc()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to delete vpc '{}'", vpc_id), e))?;
        Ok(())
    }

    async fn create_internet_gateway(&self, vpc_id: &str) -> ClientResult<String> {
        let output = self
            .ec2
            .create_internet_gateway()
            .send()
            .await
            .map_err(|e| sdk_error("Unable to create internet gateway", e))?;
        let gateway_id = output
            .internet_gateway()
            .and_then(|gateway| gateway.internet_gateway_id())
            .context("Internet gateway missing internet_gateway_id field")?
            .to_string();
        self.ec2
            .attach_internet_gateway()
            .internet_gateway_id(&gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to attach internet gateway '{}'", gateway_id),
                    e,
                )
            })?;
        Ok(gateway_id)
    }

    async fn delete_internet_gateway(&self, gateway_id: &str, vpc_id: &str) -> ClientResult<()> {
        let detached = self
            .ec2
            .detach_internet_gateway()
            .internet_gateway_id(gateway_id)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to detach internet gateway '{}'", gateway_id),
                    e,
                )
            });
        if let Err(e) = detached {
            // A gateway that was never attached can still be deleted.
            if !e.is_not_found() && e.code() != Some("Gateway.NotAttached") {
                return Err(e);
            }
            debug!("{}", e);
        }
        self.ec2
            .delete_internet_gateway()
            .internet_gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to delete internet gateway '{}'", gateway_id),
                    e,
                )
            })?;
        Ok(())
    }

    async fn create_route_table(&self, vpc_id: &str, gateway_id: &str) -> ClientResult<String> {
        let output = self
            .ec2
            .create_route_table()
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to create route table in '{}'", vpc_id), e))?;
        let route_table_id = output
            .route_table()
            .and_then(|route_table| route_table.route_table_id())
            .context("Route table missing route_table_id field")?
            .to_string();
        self.ec2
            .create_route()
            .route_table_id(&route_table_id)
            .destination_cidr_block("0.0.0.0/0")
            .gateway_id(gateway_id)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to create default route in '{}'", route_table_id),
                    e,
                )
            })?;
        Ok(route_table_id)
    }

    async fn associate_route_table(
        &self,
        route_table_id: &str,
        subnet_id: &str,
    ) -> ClientResult<()> {
        self.ec2
            .associate_route_table()
            .route_table_id(route_table_id)
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!(
                        "Unable to associate route table '{}' with '{}'",
                        route_table_id, subnet_id
                    ),
                    e,
                )
            })?;
        Ok(())
    }

    async fn delete_route_table(&self, route_table_id: &str) -> ClientResult<()> {
        self.ec2
            .delete_route_table()
            .route_table_id(route_table_id)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to delete route table '{}'", route_table_id),
                    e,
                )
            })?;
        Ok(())
    }

    async fn create_subnet(&self, vpc_id: &str, cidr: &str, zone: &str) -> ClientResult<Subnet> {
        let output = self
            .ec2
            .create_subnet()
            .vpc_id(vpc_id)
            .cidr_block(cidr)
            .availability_zone(zone)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to create subnet '{}' in '{}'", cidr, zone),
                    e,
                )
            })?;
        subnet(output.subnet().context("Create subnet output missing subnet")?)
    }

    async fn describe_subnets(&self, filter: SubnetFilter) -> ClientResult<Vec<Subnet>> {
        let request = match &filter {
            SubnetFilter::Vpc(vpc_id) => self
                .ec2
                .describe_subnets()
                .filters(Filter::builder().name("vpc-id").values(vpc_id).build()),
            SubnetFilter::Ids(ids) => self.ec2.describe_subnets().set_subnet_ids(Some(ids.clone())),
        };
        let output = request
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to describe subnets {:?}", filter), e))?;
        let mut subnets = output
            .subnets()
            .unwrap_or_default()
            .iter()
            .map(subnet)
            .collect::<ClientResult<Vec<_>>>()?;
        if let SubnetFilter::Ids(ids) = &filter {
            // Keep the caller's order.
            subnets.sort_by_key(|subnet| ids.iter().position(|id| id == &subnet.subnet_id));
        }
        Ok(subnets)
    }

    async fn enable_public_ip(&self, subnet_id: &str) -> ClientResult<()> {
        self.ec2
            .modify_subnet_attribute()
            .subnet_id(subnet_id)
            .map_public_ip_on_launch(AttributeBooleanValue::builder().value(true).build())
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to enable public ips on '{}'", subnet_id),
                    e,
                )
            })?;
        Ok(())
    }

    async fn delete_subnet(&self, subnet_id: &str) -> ClientResult<()> {
        self.ec2
            .delete_subnet()
            .subnet_id(subnet_id)
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to delete subnet '{}'", subnet_id), e))?;
        Ok(())
    }

    async fn create_security_group(
        &self,
        name: &str,
        description: &str,
        vpc_id: &str,
    ) -> ClientResult<String> {
        let output = self
            .ec2
            .create_security_group()
            .group_name(name)
            .description(description)
            .vpc_id(vpc_id)
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to create security group '{}'", name), e))?;
        Ok(output
            .group_id()
            .context("Security group missing group_id field")?
            .to_string())
    }

    async fn authorize_ingress(&self, group_id: &str, rules: &[IngressRule]) -> ClientResult<()> {
        let permissions = rules
            .iter()
            .map(|rule| {
                IpPermission::builder()
                    .ip_protocol(&rule.protocol)
                    .from_port(i32::from(rule.from_port))
                    .to_port(i32::from(rule.to_port))
                    .ip_ranges(IpRange::builder().cidr_ip(&rule.cidr).build())
                    .build()
            })
            .collect();
        self.ec2
            .authorize_security_group_ingress()
            .group_id(group_id)
            .set_ip_permissions(Some(permissions))
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to authorize ingress on '{}'", group_id),
                    e,
                )
            })?;
        Ok(())
    }

    async fn delete_security_group(&self, group_id: &str) -> ClientResult<()> {
        self.ec2
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to delete security group '{}'", group_id),
                    e,
                )
            })?;
        Ok(())
    }

    async fn run_instances(&self, request: &RunInstancesRequest) -> ClientResult<()> {
        let count = to_i32(request.count, "Instance count")?;
        let tags = request
            .tags
            .iter()
            .fold(
                TagSpecification::builder().resource_type(ResourceType::Instance),
                |builder, (key, value)| builder.tags(Tag::builder().key(key).value(value).build()),
            )
            .build();
        self.ec2
            .run_instances()
            .client_token(&request.client_token)
            .image_id(&request.image_id)
            .instance_type(InstanceType::from(request.instance_type.as_str()))
            .key_name(&request.key_name)
            .subnet_id(&request.subnet_id)
            .set_security_group_ids(Some(request.security_group_ids.clone()))
            .user_data(&request.user_data)
            .min_count(count)
            .max_count(count)
            .instance_initiated_shutdown_behavior(ShutdownBehavior::Terminate)
            .tag_specifications(tags)
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!(
                        "Unable to run {} instance(s) in '{}'",
                        request.count, request.subnet_id
                    ),
                    e,
                )
            })?;
        Ok(())
    }

    async fn describe_instances(
        &self,
        filter: InstanceFilter,
    ) -> ClientResult<Vec<ObservedInstance>> {
        let mut instances = Vec::new();
        let mut next_token: Option<String> = None;
        loop {
            let request = match &filter {
                InstanceFilter::ClientToken(token) => self.ec2.describe_instances().filters(
                    Filter::builder().name("client-token").values(token).build(),
                ),
                InstanceFilter::Ids(ids) => self
                    .ec2
                    .describe_instances()
                    .set_instance_ids(Some(ids.clone())),
            };
            let output = request
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_error(format!("Unable to describe instances {:?}", filter), e))?;
            for reservation in output.reservations().unwrap_or_default() {
                for instance in reservation.instances().unwrap_or_default() {
                    instances.push(observed(instance)?);
                }
            }
            match output.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }
        trace!("Described {} instance(s) for {:?}", instances.len(), filter);
        Ok(instances)
    }

    async fn terminate_instances(&self, instance_ids: &[String]) -> ClientResult<()> {
        self.ec2
            .terminate_instances()
            .set_instance_ids(Some(instance_ids.to_vec()))
            .send()
            .await
            .map_err(|e| sdk_error("Unable to terminate instances", e))?;
        Ok(())
    }
}
