use fleet_model::Instance;
use fleet_provisioner::clients::{
    ClientError, ClientResult, RemoteShell, RetryPolicy, ShellConnector,
};
use fleet_provisioner::READY_LOG_COMMAND;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// What the cloud-init log of a booted instance ends with.
pub(crate) const READY_OUTPUT: &str =
    "Cloud-init v. 19.3 running 'modules:final'\nAWS_K8S_TESTER_EC2_PLUGIN_READY\n";
pub(crate) const BOOTING_OUTPUT: &str = "Cloud-init v. 19.3 running 'modules:final'\n";

#[derive(Default)]
pub(crate) struct ShellState {
    /// Per instance, the results of successive `run` calls. A run past the end of the script sees
    /// `READY_OUTPUT`. `None` fails the run.
    pub(crate) scripts: HashMap<String, VecDeque<Option<String>>>,
    /// Instances that are never ready.
    pub(crate) never_ready: BTreeSet<String>,
    /// Per instance, how many connection attempts fail before one succeeds.
    pub(crate) connect_failures: HashMap<String, usize>,
    /// Instances whose `send_file` fails.
    pub(crate) send_failures: BTreeSet<String>,
    pub(crate) connects: HashMap<String, usize>,
    pub(crate) closes: HashMap<String, usize>,
    pub(crate) runs: HashMap<String, usize>,
    /// `(instance id, local path, remote path)` of every file sent.
    pub(crate) sent: Vec<(String, PathBuf, String)>,
}

/// A `ShellConnector` whose shells answer from a script.
#[derive(Default)]
pub(crate) struct MockConnector {
    pub(crate) state: Arc<Mutex<ShellState>>,
}

impl MockConnector {
    pub(crate) fn script(&self, instance_id: &str, outputs: &[Option<&str>]) {
        self.state.lock().unwrap().scripts.insert(
            instance_id.to_string(),
            outputs.iter().map(|o| o.map(str::to_string)).collect(),
        );
    }

    pub(crate) fn never_ready(&self, instance_id: &str) {
        self.state
            .lock()
            .unwrap()
            .never_ready
            .insert(instance_id.to_string());
    }

    pub(crate) fn fail_connects(&self, instance_id: &str, failures: usize) {
        self.state
            .lock()
            .unwrap()
            .connect_failures
            .insert(instance_id.to_string(), failures);
    }

    pub(crate) fn fail_sends(&self, instance_id: &str) {
        self.state
            .lock()
            .unwrap()
            .send_failures
            .insert(instance_id.to_string());
    }

    pub(crate) fn connects(&self, instance_id: &str) -> usize {
        count(&self.state.lock().unwrap().connects, instance_id)
    }

    pub(crate) fn closes(&self, instance_id: &str) -> usize {
        count(&self.state.lock().unwrap().closes, instance_id)
    }

    pub(crate) fn runs(&self, instance_id: &str) -> usize {
        count(&self.state.lock().unwrap().runs, instance_id)
    }

    pub(crate) fn sent(&self) -> Vec<(String, PathBuf, String)> {
        self.state.lock().unwrap().sent.clone()
    }
}

fn count(counts: &HashMap<String, usize>, instance_id: &str) -> usize {
    counts.get(instance_id).copied().unwrap_or_default()
}

#[async_trait::async_trait]
impl ShellConnector for MockConnector {
    async fn connect(&self, instance: &Instance) -> ClientResult<Box<dyn RemoteShell>> {
        let id = &instance.instance_id;
        let mut state = self.state.lock().unwrap();
        *state.connects.entry(id.clone()).or_default() += 1;
        if let Some(failures) = state.connect_failures.get_mut(id) {
            if *failures > 0 {
                *failures -= 1;
                return Err(ClientError::new_with_context(format!(
                    "Unable to connect to '{}'",
                    instance.ssh_address()
                )));
            }
        }
        Ok(Box::new(MockShell {
            instance_id: id.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

pub(crate) struct MockShell {
    instance_id: String,
    state: Arc<Mutex<ShellState>>,
}

#[async_trait::async_trait]
impl RemoteShell for MockShell {
    async fn run(&mut self, command: &str, _retry: RetryPolicy) -> ClientResult<String> {
        assert_eq!(command, READY_LOG_COMMAND);
        let mut state = self.state.lock().unwrap();
        *state.runs.entry(self.instance_id.clone()).or_default() += 1;
        if state.never_ready.contains(&self.instance_id) {
            return Ok(BOOTING_OUTPUT.to_string());
        }
        let next = state
            .scripts
            .get_mut(&self.instance_id)
            .and_then(VecDeque::pop_front);
        match next {
            None => Ok(READY_OUTPUT.to_string()),
            Some(Some(output)) => Ok(output),
            Some(None) => Err(ClientError::new_with_context(format!(
                "Connection to '{}' was reset",
                self.instance_id
            ))),
        }
    }

    async fn send_file(
        &mut self,
        local: &Path,
        remote: &str,
        _retry: RetryPolicy,
    ) -> ClientResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.send_failures.contains(&self.instance_id) {
            return Err(ClientError::new_with_context(format!(
                "Unable to write '{}'",
                remote
            )));
        }
        state
            .sent
            .push((self.instance_id.clone(), local.to_path_buf(), remote.to_string()));
        Ok(())
    }

    async fn close(&mut self) -> ClientResult<()> {
        *self
            .state
            .lock()
            .unwrap()
            .closes
            .entry(self.instance_id.clone())
            .or_default() += 1;
        Ok(())
    }
}
