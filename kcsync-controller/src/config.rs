//! Controller tuning.

use std::time::Duration;

use crate::clients::DEFAULT_TIMEOUT;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Concurrent reconcile workers.
    pub workers: usize,
    /// Per-call timeout for Kafka Connect requests.
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Requeue delay after a clean cycle.
    pub poll_interval: Duration,
    pub backoff_min: Duration,
    pub backoff_max: Duration,
    /// Config keys ignored by drift detection in addition to `name`.
    pub extra_ignored_keys: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            request_timeout: DEFAULT_TIMEOUT,
            connect_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_secs(60),
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            extra_ignored_keys: Vec::new(),
        }
    }
}
