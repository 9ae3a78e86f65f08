/*!

In-memory implementations of the provisioner's clients so that whole provisioning runs can be
tested without AWS or SSH. Each mock records what was asked of it and can be told to fail.

!*/

#![allow(dead_code)]

pub(crate) mod cloud_client;
pub(crate) mod shell;
pub(crate) mod store;

use cloud_client::MockCloud;
use fleet_model::FleetConfig;
use fleet_provisioner::clients::{Checkpoint, ClientError, ClientResult, Clients};
use shell::MockConnector;
use std::path::Path;
use std::sync::{Arc, Mutex};
use store::MockStore;

/// Keeps every configuration it is asked to persist.
#[derive(Default)]
pub(crate) struct MockCheckpoint {
    pub(crate) synced: Mutex<Vec<FleetConfig>>,
    pub(crate) fail: Mutex<bool>,
}

impl MockCheckpoint {
    pub(crate) fn last(&self) -> Option<FleetConfig> {
        self.synced.lock().unwrap().last().cloned()
    }

    pub(crate) fn count(&self) -> usize {
        self.synced.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl Checkpoint for MockCheckpoint {
    async fn sync(&self, config: &FleetConfig) -> ClientResult<()> {
        if *self.fail.lock().unwrap() {
            return Err(ClientError::new_with_context("disk is full"));
        }
        self.synced.lock().unwrap().push(config.clone());
        Ok(())
    }
}

/// Every mock, plus the `Clients` that share them.
pub(crate) struct Mocks {
    pub(crate) cloud: Arc<MockCloud>,
    pub(crate) shell: Arc<MockConnector>,
    pub(crate) store: Arc<MockStore>,
    pub(crate) checkpoint: Arc<MockCheckpoint>,
}

impl Mocks {
    pub(crate) fn new() -> Self {
        Self {
            cloud: Arc::new(MockCloud::default()),
            shell: Arc::new(MockConnector::default()),
            store: Arc::new(MockStore::default()),
            checkpoint: Arc::new(MockCheckpoint::default()),
        }
    }

    pub(crate) fn clients(&self) -> Clients {
        Clients {
            cloud: self.cloud.clone(),
            shell: self.shell.clone(),
            store: Some(self.store.clone()),
            checkpoint: self.checkpoint.clone(),
        }
    }
}

/// A valid configuration persisted inside `dir`.
pub(crate) fn fleet_config(dir: &Path, count: usize) -> FleetConfig {
    let mut config = FleetConfig::default_for(dir.join("fleet.yaml"));
    config.id = "fleet-test".to_string();
    config.key_name = config.id.clone();
    config.tag = config.id.clone();
    config.image_id = "ami-0123456789".to_string();
    config.count = count;
    config
}
