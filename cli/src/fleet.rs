use crate::error::{self, Result};
use crate::INTERRUPTED_EXIT_CODE;
use fleet_model::FleetConfig;
use fleet_provisioner::clients::{
    aws_config, Clients, Ec2Client, FileCheckpoint, S3Store, SshConnector,
};
use fleet_provisioner::{Deployer, PollPolicy};
use log::{info, warn};
use snafu::ResultExt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;

/// Load the configuration at `path` and apply `FLEET_*` environment overrides.
pub(crate) fn load_config(path: &Path) -> Result<FleetConfig> {
    let mut config = FleetConfig::load(path).context(error::ConfigSnafu)?;
    config
        .apply_env_overrides()
        .context(error::EnvOverridesSnafu)?;
    config
        .validate_and_set_defaults()
        .context(error::ConfigSnafu)?;
    Ok(config)
}

/// Build a deployer backed by AWS and SSH for the configuration at `path`. The deployer is
/// stopped when the process receives SIGINT or SIGTERM.
pub(crate) async fn deployer(path: &Path) -> Result<Arc<Deployer>> {
    let config = load_config(path)?;
    let sdk_config = aws_config(&config.region).await;
    let clients = Clients {
        cloud: Arc::new(Ec2Client::new(&sdk_config)),
        shell: Arc::new(SshConnector::new(&config.key_path, &config.user_name)),
        store: Some(Arc::new(S3Store::new(&sdk_config, config.region.clone()))),
        checkpoint: Arc::new(FileCheckpoint),
    };
    let deployer = Arc::new(
        Deployer::new(config, clients, PollPolicy::default())
            .await
            .context(error::ProvisionSnafu)?,
    );
    stop_on_signal(Arc::clone(&deployer));
    Ok(deployer)
}

fn stop_on_signal(deployer: Arc<Deployer>) {
    tokio::spawn(handle_signals(
        next_signal,
        move || deployer.stop(),
        || {
            std::process::exit(INTERRUPTED_EXIT_CODE);
        },
    ));
}

/// The first signal calls `stop`, after which the deployer rolls back or finishes its teardown.
/// A second signal calls `exit`.
async fn handle_signals<F, Fut>(mut next: F, stop: impl FnOnce(), exit: impl FnOnce())
where
    F: FnMut() -> Fut,
    Fut: Future<Output = &'static str>,
{
    let signal = next().await;
    info!("Received {}, stopping", signal);
    stop();
    let signal = next().await;
    warn!("Received {} again, exiting without cleaning up", signal);
    exit();
}

async fn next_signal() -> &'static str {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = terminate() => "SIGTERM",
    }
}

async fn terminate() {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            term.recv().await;
        }
        Err(e) => {
            warn!("Unable to listen for SIGTERM: {}", e);
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod test {
    use super::handle_signals;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::sync::{mpsc, Mutex};

    #[tokio::test]
    async fn second_signal_exits() {
        let (tx, rx) = mpsc::unbounded_channel::<&'static str>();
        let rx = Arc::new(Mutex::new(rx));
        let stops = Arc::new(AtomicUsize::new(0));
        let exits = Arc::new(AtomicUsize::new(0));
        let handler = tokio::spawn(handle_signals(
            move || {
                let rx = Arc::clone(&rx);
                async move { rx.lock().await.recv().await.unwrap_or("closed") }
            },
            {
                let stops = Arc::clone(&stops);
                move || {
                    stops.fetch_add(1, Ordering::SeqCst);
                }
            },
            {
                let exits = Arc::clone(&exits);
                move || {
                    exits.fetch_add(1, Ordering::SeqCst);
                }
            },
        ));

        tx.send("SIGINT").unwrap();
        while stops.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        tokio::task::yield_now().await;
        assert_eq!(exits.load(Ordering::SeqCst), 0);

        tx.send("SIGINT").unwrap();
        handler.await.unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(exits.load(Ordering::SeqCst), 1);
    }
}
