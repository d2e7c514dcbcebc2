//! Pure decision step of a reconcile cycle.

use serde::{Deserialize, Serialize};

use crate::diff::DiffEngine;
use crate::model::{ConnectorSpec, DeletionPolicy};
use crate::status::ObservedConnector;

/// Where a resource stands relative to its remote connector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReconcileState {
    /// The connector does not exist on the cluster.
    Unobserved,
    UpToDate,
    Drifted,
    /// Deletion requested, remote delete not yet confirmed.
    Deleting,
    /// Deletion confirmed; the resource can be finalized.
    Gone,
}

impl ReconcileState {
    /// State established by Observe, before the configuration diff.
    pub fn observed(deletion_requested: bool, exists: bool) -> Self {
        if deletion_requested {
            ReconcileState::Deleting
        } else if exists {
            ReconcileState::UpToDate
        } else {
            ReconcileState::Unobserved
        }
    }
}

/// The single mutating call a cycle may perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    None,
    Create,
    Update,
    Delete,
    /// Deletion without touching the remote connector.
    Orphan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub state: ReconcileState,
    pub action: Action,
}

/// Decide the corrective action for one cycle.
///
/// Deletion wins over everything else; an absent connector is created; an
/// existing one is updated only when the diff engine reports drift.
pub fn decide(
    state: ReconcileState,
    spec: &ConnectorSpec,
    observed: Option<&ObservedConnector>,
    diff: &DiffEngine,
) -> Decision {
    match state {
        ReconcileState::Deleting => Decision {
            state,
            action: match spec.deletion_policy {
                DeletionPolicy::Delete => Action::Delete,
                DeletionPolicy::Orphan => Action::Orphan,
            },
        },
        ReconcileState::Gone => Decision {
            state,
            action: Action::None,
        },
        ReconcileState::Unobserved => Decision {
            state,
            action: Action::Create,
        },
        ReconcileState::UpToDate | ReconcileState::Drifted => match observed {
            Some(o) if diff.needs_update(&spec.for_provider, o) => Decision {
                state: ReconcileState::Drifted,
                action: Action::Update,
            },
            Some(_) => Decision {
                state: ReconcileState::UpToDate,
                action: Action::None,
            },
            None => Decision {
                state: ReconcileState::Unobserved,
                action: Action::Create,
            },
        },
    }
}
