//! Events emitted by store changes.

/// Events emitted when desired state or status changes.
///
/// These events are dispatched via a broadcast channel to subscribers. The
/// controller enqueues the named resource on every spec-side event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    /// A connector was declared or its spec changed.
    ConnectorApplied { name: String },
    /// Deletion of a connector was requested.
    DeletionRequested { name: String },
    /// A reconcile cycle wrote status.
    StatusUpdated { name: String },
    /// A deleted connector was finalized and removed from the store.
    Finalized { name: String },
    /// A ProviderConfig or Secret changed; every connector may be affected.
    ConnectionChanged,
}

impl StoreEvent {
    /// Resource to reconcile for this event, if it names one.
    pub fn connector(&self) -> Option<&str> {
        match self {
            StoreEvent::ConnectorApplied { name } | StoreEvent::DeletionRequested { name } => {
                Some(name)
            }
            _ => None,
        }
    }
}
