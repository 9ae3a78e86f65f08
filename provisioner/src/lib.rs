/*!

`fleet-provisioner` creates and tears down a fleet of EC2 instances for ephemeral test clusters,
and waits for the instances to finish booting.

A `Deployer` drives the phases of a run: key pair, network, security group and instance launch.
Every phase records what it created in the `FleetConfig` and checkpoints it, so that `delete` can
find every resource the fleet owns even after an interrupted run. The remote services are reached
through the traits in `clients`.

!*/

#![deny(
    clippy::expect_used,
    clippy::get_unwrap,
    clippy::panic,
    clippy::panic_in_result_fn,
    clippy::panicking_unwrap,
    clippy::unwrap_in_result,
    clippy::unwrap_used
)]

pub use deployer::{ssh_commands, Deployer};
pub use error::{Error, Result};
pub use launcher::{plan_launch, LaunchRequest, BATCH_CAP};
pub use logs::upload_run_logs;
pub use network::subnet_cidrs;
pub use policy::PollPolicy;
pub use security_group::security_group_name;
pub use wait::{is_ready, wait_for_ready, READY_LOG_COMMAND};

pub mod clients;
mod deployer;
mod error;
mod key_pair;
mod launcher;
mod logs;
mod network;
mod policy;
mod security_group;
mod step;
mod wait;
