//! Per-call deadline and cancellation.

use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

/// Default per-call timeout for Kafka Connect requests.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Bounds a single client call: each call gets `timeout`, clipped to an
/// optional overall deadline, and is abandoned when shutdown is signalled.
#[derive(Debug, Clone)]
pub struct RequestContext {
    timeout: Duration,
    deadline: Option<Instant>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl RequestContext {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            deadline: None,
            shutdown: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Cancel in-flight calls once `true` is published on `shutdown`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Time budget for the next call.
    pub fn call_timeout(&self) -> Duration {
        match self.deadline {
            Some(deadline) => self
                .timeout
                .min(deadline.saturating_duration_since(Instant::now())),
            None => self.timeout,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|rx| *rx.borrow())
    }

    /// Resolves once shutdown is signalled. Never resolves without a shutdown
    /// channel, or after its sender is dropped without signalling.
    pub async fn cancelled(&self) {
        if let Some(rx) = &self.shutdown {
            let mut rx = rx.clone();
            if rx.wait_for(|stop| *stop).await.is_ok() {
                return;
            }
        }
        std::future::pending::<()>().await
    }
}
