//! Declared connector resources and their user-visible status.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clients::CreateConnectorRequest;
use crate::conditions::Conditions;
use crate::reconciler::ReconcileState;
use crate::status::ConnectorState;

/// Wire key carrying [`DesiredConnector::connector_class`].
pub const CONNECTOR_CLASS_KEY: &str = "connector.class";
/// Wire key carrying [`DesiredConnector::tasks_max`].
pub const TASKS_MAX_KEY: &str = "tasks.max";

fn default_tasks_max() -> u32 {
    1
}

/// Desired connector configuration, as declared by the resource owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DesiredConnector {
    /// Connector name on the Kafka Connect cluster. Immutable.
    pub name: String,
    pub connector_class: String,
    #[serde(default = "default_tasks_max")]
    pub tasks_max: u32,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    /// Overrides the ProviderConfig endpoint for this connector.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kafka_connect_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid connector spec: {0}")]
pub struct ValidationError(pub String);

impl DesiredConnector {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError("name must not be empty".to_string()));
        }
        if self.connector_class.trim().is_empty() {
            return Err(ValidationError("connectorClass must not be empty".to_string()));
        }
        if self.tasks_max < 1 {
            return Err(ValidationError("tasksMax must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Configuration map in wire form. The typed fields win over keys of the
    /// same name in `config`.
    pub fn wire_config(&self) -> BTreeMap<String, String> {
        let mut config = self.config.clone();
        config.insert(CONNECTOR_CLASS_KEY.to_string(), self.connector_class.clone());
        config.insert(TASKS_MAX_KEY.to_string(), self.tasks_max.to_string());
        config
    }

    pub fn create_request(&self) -> CreateConnectorRequest {
        CreateConnectorRequest {
            name: self.name.clone(),
            config: self.wire_config(),
        }
    }
}

/// What happens to the remote connector when the resource is deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeletionPolicy {
    #[default]
    Delete,
    /// Leave the remote connector running.
    Orphan,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorSpec {
    pub for_provider: DesiredConnector,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_config_ref: Option<String>,
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

/// Status of one connector task as reported to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatus {
    pub id: u32,
    pub state: ConnectorState,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Projection of the last successful status read. Replaced wholesale on every
/// fresh observation, never merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ConnectorState>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tasks: Vec<TaskStatus>,
}

/// Everything the controller writes back for a resource.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default)]
    pub at_provider: ConnectorStatus,
    #[serde(default)]
    pub conditions: Conditions,
    /// Reconcile state reached by the last completed cycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<ReconcileState>,
}

/// A declared connector together with its lifecycle flags and status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectorResource {
    /// Resource name in the desired-state store.
    pub name: String,
    pub spec: ConnectorSpec,
    #[serde(default)]
    pub deletion_requested: bool,
    #[serde(default)]
    pub status: ResourceStatus,
}

impl ConnectorResource {
    pub fn new(name: impl Into<String>, spec: ConnectorSpec) -> Self {
        Self {
            name: name.into(),
            spec,
            deletion_requested: false,
            status: ResourceStatus::default(),
        }
    }

    pub fn desired(&self) -> &DesiredConnector {
        &self.spec.for_provider
    }
}
