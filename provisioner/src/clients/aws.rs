use super::error::ClientError;
use aws_config::retry::RetryConfig;
use aws_sdk_ec2::types::SdkError;
use aws_smithy_types::retry::{ProvideErrorKind, RetryMode};
use aws_types::region::Region;
use aws_types::SdkConfig;
use log::info;

/// Build the config shared by every AWS client. Throttling is common while a fleet is launched,
/// so calls use adaptive retries.
pub async fn aws_config(region: &str) -> SdkConfig {
    info!(
        "Creating a custom region provider for '{}' to be used in the aws config.",
        region
    );
    aws_config::from_env()
        .retry_config(
            RetryConfig::standard()
                .with_retry_mode(RetryMode::Adaptive)
                .with_max_attempts(15),
        )
        .region(Region::new(region.to_string()))
        .load()
        .await
}

/// Convert an SDK error into a `ClientError`, keeping the service error code when there is one.
pub(super) fn sdk_error<S, E>(context: S, err: SdkError<E>) -> ClientError
where
    S: Into<String>,
    E: ProvideErrorKind + std::error::Error + Send + Sync + 'static,
{
    let code = match &err {
        SdkError::ServiceError(service_error) => service_error.err().code().map(str::to_string),
        _ => None,
    };
    ClientError::new_with_source_and_context(context, err).with_code(code)
}
