use snafu::Snafu;
use std::path::PathBuf;

/// The crate-wide result type.
pub(crate) type Result<T> = std::result::Result<T, Error>;

/// The crate-wide error type.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum Error {
    #[snafu(display("Unable to back up configuration: {}", source))]
    Backup { source: fleet_model::Error },

    #[snafu(display("Unable to load configuration: {}", source))]
    Config { source: fleet_model::Error },

    #[snafu(display(
        "Configuration '{}' already exists, delete it or choose another path",
        path.display()
    ))]
    ConfigExists { path: PathBuf },

    #[snafu(display("Unable to apply environment overrides: {}", source))]
    EnvOverrides { source: fleet_model::Error },

    #[snafu(display("{}", source))]
    Provision { source: fleet_provisioner::Error },

    #[snafu(display("Unable to write configuration: {}", source))]
    Sync { source: fleet_model::Error },

    #[snafu(display("Either --all or at least one --instance-id is required"))]
    WaitTarget,
}

impl Error {
    pub(crate) fn is_interrupted(&self) -> bool {
        match self {
            Error::Provision { source } => source.is_interrupted(),
            _ => false,
        }
    }
}
