use crate::clients::RetryPolicy;
use std::time::Duration;

/// Every pause, poll interval and deadline used while provisioning. `Default` holds the values
/// used against real AWS; tests shrink them.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PollPolicy {
    /// Pause between the requests a large per-subnet share is split into.
    pub launch_batch_pause: Duration,
    /// Pause between client token lookups while waiting for instances to run.
    pub reconcile_interval: Duration,
    /// Reconciliation gives up after this much time per desired instance.
    pub reconcile_deadline_per_instance: Duration,
    /// Wait after deleting the key pair before checking that it is gone.
    pub key_pair_settle: Duration,
    /// Wait per instance after requesting termination, before polling.
    pub terminate_settle_per_instance: Duration,
    pub terminate_settle_cap: Duration,
    pub terminate_interval: Duration,
    pub terminate_deadline_per_instance: Duration,
    /// Pause between readiness checks of an instance.
    pub readiness_interval: Duration,
    /// Overall limit on waiting for readiness. `None` waits until stopped.
    pub readiness_deadline: Option<Duration>,
    /// Retries of a single remote shell call.
    pub shell_retry: RetryPolicy,
    /// Attempts to delete a network resource that is still in use.
    pub dependency_retry_attempts: u32,
    pub dependency_retry_interval: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            launch_batch_pause: Duration::from_secs(10),
            reconcile_interval: Duration::from_secs(5),
            reconcile_deadline_per_instance: Duration::from_secs(120),
            key_pair_settle: Duration::from_secs(2),
            terminate_settle_per_instance: Duration::from_secs(5),
            terminate_settle_cap: Duration::from_secs(180),
            terminate_interval: Duration::from_secs(5),
            terminate_deadline_per_instance: Duration::from_secs(120),
            readiness_interval: Duration::from_secs(5),
            readiness_deadline: None,
            shell_retry: RetryPolicy {
                attempts: 100,
                interval: Duration::from_secs(5),
                timeout: Duration::from_secs(30),
            },
            dependency_retry_attempts: 12,
            dependency_retry_interval: Duration::from_secs(10),
        }
    }
}

/// `per_instance * count`, saturating instead of overflowing.
pub(crate) fn scaled(per_instance: Duration, count: usize) -> Duration {
    per_instance.saturating_mul(u32::try_from(count).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod test {
    use super::scaled;
    use std::time::Duration;

    #[test]
    fn scaled_saturates() {
        assert_eq!(scaled(Duration::from_secs(120), 3), Duration::from_secs(360));
        assert_eq!(scaled(Duration::MAX, 2), Duration::MAX);
    }
}
