/*!

This library provides the configuration model for an EC2 test fleet: the `FleetConfig` that is
created once per provisioning run, mutated in place as each phase completes, and persisted to
disk so that an interrupted run still knows which resources it owns.

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

pub use env::{render_env_help, EnvField, Field, FieldKind, FIELDS};
pub use error::{Error, Result};
pub use fleet::FleetConfig;
pub use instance::{Instance, LaunchBatch};

pub mod constants;
mod env;
mod error;
mod fleet;
mod instance;
