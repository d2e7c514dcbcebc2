//! Reconcilers for declared resources.
//!
//! A reconciler compares desired state (the declared spec) with actual state
//! (read from the remote API), performs at most one corrective call and
//! returns the status to write back.

pub mod connector;
mod decide;

use async_trait::async_trait;

pub use connector::ConnectorReconciler;
pub use decide::{decide, Action, Decision, ReconcileState};

use crate::clients::RequestContext;
use crate::model::{ConnectorResource, ResourceStatus};

/// How a cycle ended, as far as scheduling is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleResult {
    /// In sync, nothing done, no error.
    Clean,
    /// A mutating call succeeded; confirm on the next cycle.
    Acted,
    /// An error was recorded on the resource.
    Failed,
    /// Deletion completed; finalize the resource.
    Gone,
    /// Shutdown interrupted the cycle; nothing is written.
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub result: CycleResult,
    pub action: Action,
    /// Status to write back. Ignored for cancelled cycles.
    pub status: ResourceStatus,
    pub error: Option<String>,
}

impl CycleOutcome {
    pub fn failed(status: ResourceStatus, error: impl Into<String>) -> Self {
        Self {
            result: CycleResult::Failed,
            action: Action::None,
            status,
            error: Some(error.into()),
        }
    }

    pub fn cancelled(status: ResourceStatus) -> Self {
        Self {
            result: CycleResult::Cancelled,
            action: Action::None,
            status,
            error: None,
        }
    }
}

/// Trait for resource reconcilers.
#[async_trait]
pub trait Reconciler: Send + Sync {
    /// Run one Observe, Decide, Act, Report cycle for `resource`.
    async fn reconcile(&self, resource: &ConnectorResource, ctx: &RequestContext) -> CycleOutcome;
}
