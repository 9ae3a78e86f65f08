use fleet_provisioner::clients::{ClientError, ClientResult, ObjectStore, PutObject};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

/// An `ObjectStore` that keeps buckets and objects in memory.
#[derive(Default)]
pub(crate) struct MockStore {
    pub(crate) buckets: Mutex<BTreeSet<String>>,
    pub(crate) tags: Mutex<BTreeMap<String, Vec<(String, String)>>>,
    pub(crate) objects: Mutex<BTreeMap<String, PutObject>>,
}

impl MockStore {
    /// Object keys, as `bucket/key`.
    pub(crate) fn keys(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub(crate) fn object(&self, bucket: &str, key: &str) -> Option<PutObject> {
        self.objects
            .lock()
            .unwrap()
            .get(&format!("{}/{}", bucket, key))
            .cloned()
    }
}

#[async_trait::async_trait]
impl ObjectStore for MockStore {
    async fn create_bucket(&self, bucket: &str) -> ClientResult<()> {
        self.buckets.lock().unwrap().insert(bucket.to_string());
        Ok(())
    }

    async fn tag_bucket(&self, bucket: &str, tags: &[(String, String)]) -> ClientResult<()> {
        if !self.buckets.lock().unwrap().contains(bucket) {
            return Err(ClientError::new_with_context("mock tag_bucket failed")
                .with_code(Some("NoSuchBucket")));
        }
        self.tags
            .lock()
            .unwrap()
            .insert(bucket.to_string(), tags.to_vec());
        Ok(())
    }

    async fn put_object(&self, object: PutObject) -> ClientResult<()> {
        if !self.buckets.lock().unwrap().contains(&object.bucket) {
            return Err(ClientError::new_with_context("mock put_object failed")
                .with_code(Some("NoSuchBucket")));
        }
        let key = format!("{}/{}", object.bucket, object.key);
        self.objects.lock().unwrap().insert(key, object);
        Ok(())
    }
}
