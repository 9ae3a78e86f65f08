use env_logger::{Builder, Target};
use fleet_model::FleetConfig;
use log::LevelFilter;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// The log level and log file of a run.
pub(crate) struct LogSettings {
    level: LevelFilter,
    output: Option<PathBuf>,
}

impl LogSettings {
    /// `--log-level` wins over the configuration's `log_level`, which wins over `Info`. The
    /// configuration at `config_path` is read with environment overrides applied; if it cannot be
    /// read, the defaults and environment alone are used.
    pub(crate) fn new(log_level: Option<LevelFilter>, config_path: &Path) -> Self {
        let mut config = FleetConfig::load(config_path)
            .unwrap_or_else(|_| FleetConfig::default_for(config_path));
        // Invalid overrides are reported when the command loads the configuration.
        let _ = config.apply_env_overrides();
        let level = log_level
            .or_else(|| config.log_level.parse().ok())
            .unwrap_or(LevelFilter::Info);
        Self {
            level,
            output: config.log_output_path,
        }
    }
}

/// Initialize the logger with `settings.level` when the `RUST_LOG` environment variable is not
/// present. If present, the `RUST_LOG` environment variable overrides the level. Records go to
/// stderr and, when `settings.output` is set, are appended to that file as well.
pub(crate) fn init_logger(settings: LogSettings) {
    let mut builder = match std::env::var(env_logger::DEFAULT_FILTER_ENV).ok() {
        // RUST_LOG exists; env_logger will use it.
        Some(_) => Builder::from_default_env(),
        None => {
            // RUST_LOG does not exist; use the level for the fleet crates and errors for the rest.
            let mut builder = Builder::new();
            builder
                .filter_level(LevelFilter::Error)
                .filter(Some(env!("CARGO_CRATE_NAME")), settings.level)
                .filter(Some("fleet_provisioner"), settings.level)
                .filter(Some("fleet_model"), settings.level);
            builder
        }
    };
    if let Some(path) = &settings.output {
        match open_log_file(path) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(Tee { file })));
            }
            Err(e) => eprintln!("Unable to open log file '{}': {}", path.display(), e),
        }
    }
    builder.init();
}

fn open_log_file(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Writes everything to stderr and to `file`.
struct Tee {
    file: File,
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

#[cfg(test)]
mod test {
    use super::{LogSettings, Tee};
    use log::LevelFilter;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn flag_wins_over_configuration() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("fleet.yaml");
        std::fs::write(
            &path,
            "id: fleet-test\nlogLevel: debug\nlogOutputPath: /tmp/fleet.log\n",
        )
        .unwrap();

        let settings = LogSettings::new(None, &path);
        assert_eq!(settings.level, LevelFilter::Debug);
        assert_eq!(
            settings.output.as_deref(),
            Some(std::path::Path::new("/tmp/fleet.log"))
        );
        let settings = LogSettings::new(Some(LevelFilter::Warn), &path);
        assert_eq!(settings.level, LevelFilter::Warn);
    }

    #[test]
    fn unreadable_configuration_uses_info() {
        let dir = TempDir::new().unwrap();
        let settings = LogSettings::new(None, &dir.path().join("missing.yaml"));
        assert_eq!(settings.level, LevelFilter::Info);
    }

    #[test]
    fn tee_copies_to_the_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("logs").join("run.log");
        let mut tee = Tee {
            file: super::open_log_file(&path).unwrap(),
        };
        tee.write_all(b"first\n").unwrap();
        tee.flush().unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n");
    }
}
