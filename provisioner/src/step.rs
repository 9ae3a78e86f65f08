use crate::error::{Error, Result};
use log::{info, warn};
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Run one provisioning phase unless `token` is cancelled first. On cancellation the phase future
/// is dropped, which abandons whatever call it was waiting on, and `Error::Interrupted` is
/// returned.
pub(crate) async fn run_step<T, F>(token: &CancellationToken, step: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if token.is_cancelled() {
        warn!("Not {}, provisioning was stopped", step);
        return Err(Error::Interrupted {
            step: step.to_string(),
        });
    }
    info!("Started {}", step);
    tokio::select! {
        biased;
        _ = token.cancelled() => {
            warn!("Stopped while {}", step);
            Err(Error::Interrupted { step: step.to_string() })
        }
        result = future => result,
    }
}
