use snafu::Snafu;
use std::path::PathBuf;

/// The error type for loading, validating and persisting a `FleetConfig`.
#[derive(Debug, Snafu)]
pub struct Error(OpaqueError);
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub(crate) enum OpaqueError {
    #[snafu(display("Unable to back up configuration to '{}': {}", path.display(), source))]
    Backup {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Configuration has no path to write to"))]
    ConfigPathMissing,

    #[snafu(display("Error deserializing configuration '{}': {}", path.display(), source))]
    Deserialize {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[snafu(display(
        "Invalid value '{}' for environment variable '{}': {}",
        value,
        env,
        reason
    ))]
    EnvValue {
        env: String,
        value: String,
        reason: String,
    },

    #[snafu(display("Fleet order and fleet index disagree: {}", reason))]
    InconsistentFleet { reason: String },

    #[snafu(display("Invalid configuration: {}", reason))]
    Invalid { reason: String },

    #[snafu(display("Unable to read configuration '{}': {}", path.display(), source))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Error serializing configuration: {}", source))]
    Serialize { source: serde_yaml::Error },

    #[snafu(display("Unable to write configuration '{}': {}", path.display(), source))]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}
