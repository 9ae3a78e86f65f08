/*!

Polls every instance over SSH until its boot script has finished. An instance is ready when the
tail of its cloud-init output carries the readiness sentinel or cloud-init's own completion line:

```text
AWS_K8S_TESTER_EC2_PLUGIN_READY
Cloud-init v. 18.2 finished at Mon, 29 Oct 2018 22:43:59 +0000. Datasource DataSourceEc2Local.
```

!*/

use crate::clients::{RemoteShell, ShellConnector};
use crate::error::{Error, Result};
use crate::policy::PollPolicy;
use fleet_model::constants::READY_SENTINEL;
use fleet_model::Instance;
use log::{debug, info, warn};
use std::collections::BTreeMap;
use std::future::Future;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// The command used to fetch the end of the boot log.
pub const READY_LOG_COMMAND: &str = "tail -10 /var/log/cloud-init-output.log";

/// Whether the tail of a cloud-init output log shows that the boot script finished.
pub fn is_ready(text: &str) -> bool {
    text.contains(READY_SENTINEL)
        || (text.contains("Cloud-init v.") && text.contains("finished at"))
}

/// Wait until every instance in `instances` is ready. `instances` is a copy of the fleet index
/// and is consumed as instances become ready.
///
/// Returns `Error::WaitInterrupted` if `token` is cancelled and `Error::WaitTimeout` if the
/// policy's readiness deadline passes, both naming the instances that were not ready.
pub async fn wait_for_ready(
    mut instances: BTreeMap<String, Instance>,
    connector: &dyn ShellConnector,
    policy: &PollPolicy,
    token: &CancellationToken,
) -> Result<()> {
    let deadline = policy.readiness_deadline.map(|limit| Instant::now() + limit);
    info!("Waiting for {} instance(s) to be ready", instances.len());
    while !instances.is_empty() {
        let ids: Vec<String> = instances.keys().cloned().collect();
        for id in ids {
            let instance = match instances.get(&id) {
                Some(instance) => instance.clone(),
                None => continue,
            };
            info!("Waiting for '{}'", id);
            let ready = tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(Error::WaitInterrupted { pending: pending(&instances) });
                }
                _ = expires(deadline) => {
                    return Err(Error::WaitTimeout { pending: pending(&instances) });
                }
                ready = wait_for_instance(&instance, connector, policy) => ready,
            };
            if ready {
                instances.remove(&id);
            }
        }
        if !instances.is_empty() {
            tokio::select! {
                biased;
                _ = token.cancelled() => {
                    return Err(Error::WaitInterrupted { pending: pending(&instances) });
                }
                _ = expires(deadline) => {
                    return Err(Error::WaitTimeout { pending: pending(&instances) });
                }
                _ = tokio::time::sleep(policy.readiness_interval) => {}
            }
        }
    }
    info!("All instances are ready");
    Ok(())
}

fn pending(instances: &BTreeMap<String, Instance>) -> Vec<String> {
    instances.keys().cloned().collect()
}

fn expires(deadline: Option<Instant>) -> impl Future<Output = ()> {
    async move {
        match deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

/// Poll one instance until it is ready. Returns `false` when the instance cannot be reached, so
/// that the caller moves on and comes back to it on its next pass.
async fn wait_for_instance(
    instance: &Instance,
    connector: &dyn ShellConnector,
    policy: &PollPolicy,
) -> bool {
    let id = &instance.instance_id;
    let mut shell = match connector.connect(instance).await {
        Ok(shell) => shell,
        Err(e) => {
            warn!("Unable to connect to '{}': {}", id, e);
            return false;
        }
    };
    loop {
        tokio::time::sleep(policy.readiness_interval).await;
        let output = match shell.run(READY_LOG_COMMAND, policy.shell_retry).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Unable to fetch cloud-init output from '{}': {}", id, e);
                close(shell.as_mut(), id).await;
                shell = match connector.connect(instance).await {
                    Ok(shell) => shell,
                    Err(e) => {
                        warn!("Unable to reconnect to '{}': {}", id, e);
                        return false;
                    }
                };
                continue;
            }
        };
        debug!("cloud-init output of '{}':\n{}", id, output);
        if is_ready(&output) {
            close(shell.as_mut(), id).await;
            info!("Instance '{}' is ready", id);
            return true;
        }
        info!("Instance '{}' is not ready yet", id);
    }
}

async fn close(shell: &mut dyn RemoteShell, id: &str) {
    if let Err(e) = shell.close().await {
        warn!("Unable to close the session to '{}': {}", id, e);
    }
}

#[cfg(test)]
mod test {
    use super::is_ready;

    #[test]
    fn sentinel_is_ready() {
        assert!(is_ready("...\nAWS_K8S_TESTER_EC2_PLUGIN_READY\n"));
    }

    #[test]
    fn cloud_init_completion_is_ready() {
        assert!(is_ready(
            "Cloud-init v. 18.2 finished at Mon, 29 Oct 2018 22:43:59 +0000. Datasource \
             DataSourceEc2Local.  Up 246.57 seconds"
        ));
    }

    #[test]
    fn partial_output_is_not_ready() {
        assert!(!is_ready(
            "Cloud-init v. 18.2 running 'modules:final' at Mon, 29 Oct 2018 22:40:13 +0000."
        ));
        assert!(!is_ready("finished at"));
        assert!(!is_ready(""));
    }
}
