use super::aws::sdk_error;
use super::error::ClientResult;
use super::{ObjectStore, PutObject};
use aws_sdk_s3::model::{BucketLocationConstraint, CreateBucketConfiguration, Tag, Tagging};
use aws_sdk_s3::types::ByteStream;
use aws_smithy_types::DateTime;
use aws_types::SdkConfig;
use log::{debug, info};
use std::collections::HashMap;

/// An `ObjectStore` backed by S3.
#[derive(Clone, Debug)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    region: String,
}

impl S3Store {
    pub fn new<S: Into<String>>(config: &SdkConfig, region: S) -> Self {
        Self {
            client: aws_sdk_s3::Client::new(config),
            region: region.into(),
        }
    }
}

#[async_trait::async_trait]
impl ObjectStore for S3Store {
    async fn create_bucket(&self, bucket: &str) -> ClientResult<()> {
        info!("Creating S3 bucket '{}' in '{}'", bucket, self.region);
        let mut request = self.client.create_bucket().bucket(bucket);
        // us-east-1 rejects an explicit location constraint.
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        match request.send().await {
            Ok(_) => Ok(()),
            Err(e) => {
                let e = sdk_error(format!("Unable to create bucket '{}'", bucket), e);
                match e.code() {
                    Some("BucketAlreadyExists") | Some("BucketAlreadyOwnedByYou") => {
                        debug!("Bucket '{}' already exists", bucket);
                        Ok(())
                    }
                    _ => Err(e),
                }
            }
        }
    }

    async fn tag_bucket(&self, bucket: &str, tags: &[(String, String)]) -> ClientResult<()> {
        let tagging = tags
            .iter()
            .fold(Tagging::builder(), |builder, (key, value)| {
                builder.tag_set(Tag::builder().key(key).value(value).build())
            })
            .build();
        self.client
            .put_bucket_tagging()
            .bucket(bucket)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| sdk_error(format!("Unable to tag bucket '{}'", bucket), e))?;
        Ok(())
    }

    async fn put_object(&self, object: PutObject) -> ClientResult<()> {
        debug!(
            "Uploading {} bytes to 's3://{}/{}'",
            object.body.len(),
            object.bucket,
            object.key
        );
        let metadata: HashMap<String, String> = object.metadata.into_iter().collect();
        self.client
            .put_object()
            .bucket(&object.bucket)
            .key(&object.key)
            .body(ByteStream::from(object.body))
            .set_expires(object.expires.map(DateTime::from))
            .set_metadata(Some(metadata))
            .send()
            .await
            .map_err(|e| {
                sdk_error(
                    format!("Unable to upload 's3://{}/{}'", object.bucket, object.key),
                    e,
                )
            })?;
        Ok(())
    }
}
