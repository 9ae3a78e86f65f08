use super::error::{ClientError, ClientResult, IntoClientError};
use super::{RemoteShell, RetryPolicy, ShellConnector};
use fleet_model::Instance;
use log::{debug, trace};
use openssh::{KnownHosts, Session, SessionBuilder, Stdio};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

/// Opens SSH sessions to fleet instances using the fleet's private key.
#[derive(Clone, Debug)]
pub struct SshConnector {
    pub key_path: PathBuf,
    pub user_name: String,
    pub connect_timeout: Duration,
}

impl SshConnector {
    pub fn new<P, S>(key_path: P, user_name: S) -> Self
    where
        P: Into<PathBuf>,
        S: Into<String>,
    {
        Self {
            key_path: key_path.into(),
            user_name: user_name.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait::async_trait]
impl ShellConnector for SshConnector {
    async fn connect(&self, instance: &Instance) -> ClientResult<Box<dyn RemoteShell>> {
        let address = instance.ssh_address().to_string();
        if address.is_empty() {
            return Err(ClientError::new_with_context(format!(
                "Instance '{}' has no public address",
                instance.instance_id
            )));
        }
        debug!("Starting session for '{}' at {}", instance.instance_id, address);
        let session = SessionBuilder::default()
            .keyfile(&self.key_path)
            .user(self.user_name.clone())
            .known_hosts_check(KnownHosts::Accept)
            .user_known_hosts_file("/dev/null")
            .connect_timeout(self.connect_timeout)
            .connect_mux(&address)
            .await
            .context(format!(
                "Unable to connect to instance '{}' at '{}'",
                instance.instance_id, address
            ))?;
        Ok(Box::new(SshShell {
            address,
            session: Some(session),
        }))
    }
}

/// A multiplexed SSH session to one instance.
struct SshShell {
    address: String,
    session: Option<Session>,
}

impl SshShell {
    fn session(&self) -> ClientResult<&Session> {
        self.session
            .as_ref()
            .context(format!("The session to '{}' is closed", self.address))
    }

    async fn run_once(&self, command: &str) -> ClientResult<String> {
        let output = self
            .session()?
            .command("sh")
            .arg("-c")
            .arg(command)
            .output()
            .await
            .context(format!("Unable to run '{}' on '{}'", command, self.address))?;
        if !output.status.success() {
            return Err(ClientError::new_with_context(format!(
                "'{}' on '{}' failed with status {}: {}",
                command,
                self.address,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn send_once(&self, data: &[u8], remote: &str) -> ClientResult<()> {
        let mut child = self
            .session()?
            .command("tee")
            .arg(remote)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .spawn()
            .await
            .context(format!("Unable to start copy to '{}:{}'", self.address, remote))?;
        let mut stdin = child
            .stdin()
            .take()
            .context("Remote copy has no stdin")?;
        stdin
            .write_all(data)
            .await
            .context(format!("Unable to copy to '{}:{}'", self.address, remote))?;
        stdin
            .shutdown()
            .await
            .context(format!("Unable to copy to '{}:{}'", self.address, remote))?;
        drop(stdin);
        let status = child
            .wait()
            .await
            .context(format!("Unable to copy to '{}:{}'", self.address, remote))?;
        if !status.success() {
            return Err(ClientError::new_with_context(format!(
                "Copy to '{}:{}' failed with status {}",
                self.address, remote, status
            )));
        }
        Ok(())
    }
}

/// Attempt `operation` until it succeeds, limiting each attempt to `retry.timeout`.
async fn with_retry<T, F, Fut>(what: &str, retry: RetryPolicy, mut operation: F) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ClientResult<T>>,
{
    let attempts = retry.attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        match tokio::time::timeout(retry.timeout, operation()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(e)) => {
                trace!("Attempt {}/{} of {} failed: {}", attempt, attempts, what, e);
                last_error = Some(e);
            }
            Err(elapsed) => {
                trace!("Attempt {}/{} of {} timed out", attempt, attempts, what);
                last_error = Some(ClientError::new_with_source_and_context(
                    format!("{} timed out", what),
                    elapsed,
                ));
            }
        }
        if attempt < attempts {
            tokio::time::sleep(retry.interval).await;
        }
    }
    Err(last_error.unwrap_or_else(|| ClientError::new_with_context(format!("{} failed", what))))
}

#[async_trait::async_trait]
impl RemoteShell for SshShell {
    async fn run(&mut self, command: &str, retry: RetryPolicy) -> ClientResult<String> {
        let this = &*self;
        with_retry(command, retry, || this.run_once(command)).await
    }

    async fn send_file(
        &mut self,
        local: &Path,
        remote: &str,
        retry: RetryPolicy,
    ) -> ClientResult<()> {
        let data = tokio::fs::read(local)
            .await
            .context(format!("Unable to read '{}'", local.display()))?;
        let this = &*self;
        with_retry(&format!("copy to '{}'", remote), retry, || {
            this.send_once(&data, remote)
        })
        .await
    }

    async fn close(&mut self) -> ClientResult<()> {
        match self.session.take() {
            Some(session) => session
                .close()
                .await
                .context(format!("Unable to close session to '{}'", self.address)),
            None => Ok(()),
        }
    }
}
