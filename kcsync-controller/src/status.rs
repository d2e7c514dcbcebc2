//! Status translation: raw Kafka Connect status payloads into observations,
//! and the readiness rule over them.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::clients::{ConnectorInfo, ConnectorStatusResponse};
use crate::conditions::{Condition, REASON_AVAILABLE};
use crate::model::{ConnectorStatus, TaskStatus};

/// Runtime state shared by connectors and tasks.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ConnectorState {
    Running,
    Paused,
    Failed,
    Unassigned,
    Restarting,
    /// A state outside the known taxonomy, kept verbatim.
    Unknown(String),
}

impl ConnectorState {
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "RUNNING" => ConnectorState::Running,
            "PAUSED" => ConnectorState::Paused,
            "FAILED" => ConnectorState::Failed,
            "UNASSIGNED" => ConnectorState::Unassigned,
            "RESTARTING" => ConnectorState::Restarting,
            _ => ConnectorState::Unknown(s.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ConnectorState::Running => "RUNNING",
            ConnectorState::Paused => "PAUSED",
            ConnectorState::Failed => "FAILED",
            ConnectorState::Unassigned => "UNASSIGNED",
            ConnectorState::Restarting => "RESTARTING",
            ConnectorState::Unknown(s) => s,
        }
    }
}

impl fmt::Display for ConnectorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ConnectorState {
    fn from(s: String) -> Self {
        ConnectorState::parse(&s)
    }
}

impl From<ConnectorState> for String {
    fn from(state: ConnectorState) -> Self {
        state.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedTask {
    pub id: u32,
    pub state: ConnectorState,
    pub worker_id: String,
    /// Only present for FAILED tasks.
    pub trace: Option<String>,
}

/// Health part of an observation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedStatus {
    pub state: ConnectorState,
    pub worker_id: String,
    pub trace: Option<String>,
    pub tasks: Vec<ObservedTask>,
}

/// A connector as seen on the cluster during one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObservedConnector {
    pub name: String,
    pub config: BTreeMap<String, String>,
    pub connector_type: Option<String>,
    /// `None` when the status read failed; the connector still exists.
    pub status: Option<ObservedStatus>,
}

impl ObservedConnector {
    pub fn new(info: ConnectorInfo, status: Option<ObservedStatus>) -> Self {
        Self {
            name: info.name,
            config: info.config,
            connector_type: info.connector_type,
            status,
        }
    }
}

fn failed_trace(state: &ConnectorState, trace: &Option<String>) -> Option<String> {
    match state {
        ConnectorState::Failed => trace.clone(),
        _ => None,
    }
}

/// Translate a raw status payload. Task order is preserved.
pub fn translate(raw: &ConnectorStatusResponse) -> ObservedStatus {
    let state = ConnectorState::parse(&raw.connector.state);
    let trace = failed_trace(&state, &raw.connector.trace);

    let tasks = raw
        .tasks
        .iter()
        .map(|t| {
            let state = ConnectorState::parse(&t.state);
            ObservedTask {
                id: t.id,
                trace: failed_trace(&state, &t.trace),
                state,
                worker_id: t.worker_id.clone(),
            }
        })
        .collect();

    ObservedStatus {
        state,
        worker_id: raw.connector.worker_id.clone(),
        trace,
        tasks,
    }
}

impl From<&ObservedStatus> for ConnectorStatus {
    fn from(status: &ObservedStatus) -> Self {
        ConnectorStatus {
            state: Some(status.state.clone()),
            worker_id: status.worker_id.clone(),
            tasks: status
                .tasks
                .iter()
                .map(|t| TaskStatus {
                    id: t.id,
                    state: t.state.clone(),
                    worker_id: t.worker_id.clone(),
                    trace: t.trace.clone(),
                })
                .collect(),
        }
    }
}

pub const REASON_TASKS_FAILED: &str = "TasksFailed";
pub const REASON_CONNECTOR_NOT_RUNNING: &str = "ConnectorNotRunning";
pub const REASON_TASKS_NOT_RUNNING: &str = "TasksNotRunning";
pub const REASON_NO_TASKS: &str = "NoTasks";

/// Result of the readiness rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Readiness {
    pub ready: bool,
    pub reason: &'static str,
    pub message: String,
    pub failed_tasks: Vec<u32>,
}

impl Readiness {
    pub fn condition(&self) -> Condition {
        if self.ready {
            Condition::available()
        } else {
            Condition::unavailable(self.reason, self.message.clone())
        }
    }
}

/// Ready iff the connector is RUNNING and every task is RUNNING.
///
/// Failed tasks are reported first and by id, even when the connector itself
/// is RUNNING.
pub fn readiness(status: &ObservedStatus) -> Readiness {
    let failed_tasks: Vec<u32> = status
        .tasks
        .iter()
        .filter(|t| t.state == ConnectorState::Failed)
        .map(|t| t.id)
        .collect();

    if !failed_tasks.is_empty() {
        let ids = join_ids(&failed_tasks);
        let mut message = if failed_tasks.len() == 1 {
            format!("task {} is FAILED", ids)
        } else {
            format!("tasks {} are FAILED", ids)
        };
        if status.state != ConnectorState::Running {
            message.push_str(&format!("; connector is {}", status.state));
        }
        return Readiness {
            ready: false,
            reason: REASON_TASKS_FAILED,
            message,
            failed_tasks,
        };
    }

    if status.state != ConnectorState::Running {
        return Readiness {
            ready: false,
            reason: REASON_CONNECTOR_NOT_RUNNING,
            message: format!("connector is {}", status.state),
            failed_tasks,
        };
    }

    let not_running: Vec<String> = status
        .tasks
        .iter()
        .filter(|t| t.state != ConnectorState::Running)
        .map(|t| format!("{}={}", t.id, t.state))
        .collect();
    if !not_running.is_empty() {
        return Readiness {
            ready: false,
            reason: REASON_TASKS_NOT_RUNNING,
            message: format!("tasks not running: {}", not_running.join(", ")),
            failed_tasks,
        };
    }

    if status.tasks.is_empty() {
        return Readiness {
            ready: false,
            reason: REASON_NO_TASKS,
            message: "connector has no tasks assigned".to_string(),
            failed_tasks,
        };
    }

    Readiness {
        ready: true,
        reason: REASON_AVAILABLE,
        message: String::new(),
        failed_tasks,
    }
}

fn join_ids(ids: &[u32]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
