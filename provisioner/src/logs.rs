use crate::clients::{ObjectStore, PutObject};
use crate::error::{self, Result};
use fleet_model::FleetConfig;
use log::{info, warn};
use snafu::ResultExt;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Uploaded objects expire after this long.
const LOG_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// Upload the configuration, the log output and the private key of a run to the log bucket, under
/// `<fleet id>/<file name>`. Files that do not exist are skipped.
pub async fn upload_run_logs(config: &FleetConfig, store: &dyn ObjectStore) -> Result<()> {
    let bucket = &config.log_bucket;
    let tags = vec![("fleet-id".to_string(), config.id.clone())];
    store
        .create_bucket(bucket)
        .await
        .context(error::UploadLogsSnafu { bucket })?;
    store
        .tag_bucket(bucket, &tags)
        .await
        .context(error::UploadLogsSnafu { bucket })?;

    let mut files = vec![config.config_path.as_path()];
    if let Some(log_output_path) = &config.log_output_path {
        files.push(log_output_path.as_path());
    }
    files.push(config.key_path.as_path());

    let metadata: BTreeMap<String, String> = tags.into_iter().collect();
    for path in files {
        let body = match tokio::fs::read(path).await {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Not uploading '{}', it does not exist", path.display());
                continue;
            }
            Err(e) => return Err(e).context(error::ReadFileSnafu { path }),
        };
        let key = object_key(&config.id, path);
        store
            .put_object(PutObject {
                bucket: bucket.clone(),
                key: key.clone(),
                body,
                expires: Some(SystemTime::now() + LOG_RETENTION),
                metadata: metadata.clone(),
            })
            .await
            .context(error::UploadLogsSnafu { bucket })?;
        info!("Uploaded '{}' to 's3://{}/{}'", path.display(), bucket, key);
    }
    Ok(())
}

fn object_key(fleet_id: &str, path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());
    format!("{}/{}", fleet_id, name)
}
