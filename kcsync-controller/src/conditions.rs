//! Ready/Synced health conditions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConditionType {
    /// The remote connector and all of its tasks are running.
    Ready,
    /// The last mutating call against the remote API succeeded.
    Synced,
}

pub const REASON_AVAILABLE: &str = "Available";
pub const REASON_CREATING: &str = "Creating";
pub const REASON_DELETING: &str = "Deleting";
pub const REASON_RECONCILE_SUCCESS: &str = "ReconcileSuccess";
pub const REASON_ALREADY_EXISTS: &str = "AlreadyExists";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,
    pub status: bool,
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    pub fn new(
        condition_type: ConditionType,
        status: bool,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            condition_type,
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }

    pub fn available() -> Self {
        Self::new(ConditionType::Ready, true, REASON_AVAILABLE, "")
    }

    pub fn unavailable(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ConditionType::Ready, false, reason, message)
    }

    pub fn creating() -> Self {
        Self::new(ConditionType::Ready, false, REASON_CREATING, "")
    }

    pub fn deleting() -> Self {
        Self::new(ConditionType::Ready, false, REASON_DELETING, "")
    }

    pub fn reconcile_success() -> Self {
        Self::new(ConditionType::Synced, true, REASON_RECONCILE_SUCCESS, "")
    }

    pub fn reconcile_error(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ConditionType::Synced, false, reason, message)
    }

    /// Same condition apart from the transition time.
    pub fn equivalent(&self, other: &Condition) -> bool {
        self.condition_type == other.condition_type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
    }
}

/// Conditions keyed by type; at most one per type.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conditions(Vec<Condition>);

impl Conditions {
    pub fn get(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.0.iter().find(|c| c.condition_type == condition_type)
    }

    /// Replace the condition of the same type. An equivalent condition is
    /// left in place so its transition time survives.
    pub fn set(&mut self, condition: Condition) {
        match self
            .0
            .iter_mut()
            .find(|c| c.condition_type == condition.condition_type)
        {
            Some(existing) if existing.equivalent(&condition) => {}
            Some(existing) => *existing = condition,
            None => self.0.push(condition),
        }
    }

    pub fn status(&self, condition_type: ConditionType) -> Option<bool> {
        self.get(condition_type).map(|c| c.status)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_set_replaces_by_type() {
        let mut conditions = Conditions::default();
        conditions.set(Condition::creating());
        conditions.set(Condition::reconcile_success());
        conditions.set(Condition::available());

        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions.status(ConditionType::Ready), Some(true));
        assert_eq!(
            conditions.get(ConditionType::Ready).unwrap().reason,
            REASON_AVAILABLE
        );
    }

    #[test]
    fn test_equivalent_condition_keeps_transition_time() {
        let mut first = Condition::available();
        first.last_transition_time = Utc::now() - Duration::minutes(10);
        let original_time = first.last_transition_time;

        let mut conditions = Conditions::default();
        conditions.set(first);
        conditions.set(Condition::available());

        assert_eq!(
            conditions
                .get(ConditionType::Ready)
                .unwrap()
                .last_transition_time,
            original_time
        );
    }

    #[test]
    fn test_changed_message_replaces() {
        let mut conditions = Conditions::default();
        conditions.set(Condition::reconcile_error("TransportError", "connection refused"));
        conditions.set(Condition::reconcile_error("TransportError", "timed out"));
        assert_eq!(
            conditions.get(ConditionType::Synced).unwrap().message,
            "timed out"
        );
    }

    #[test]
    fn test_serialized_shape() {
        let mut conditions = Conditions::default();
        conditions.set(Condition::unavailable("TasksFailed", "task 1 is FAILED"));
        let json = serde_json::to_value(&conditions).unwrap();
        assert_eq!(json[0]["type"], "Ready");
        assert_eq!(json[0]["status"], false);
        assert_eq!(json[0]["reason"], "TasksFailed");
        assert!(json[0]["lastTransitionTime"].is_string());
    }
}
