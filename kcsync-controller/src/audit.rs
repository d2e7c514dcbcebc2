//! Audit trail for mutations against Kafka Connect.
//!
//! Events are emitted on the `audit` tracing target with `component` and
//! `objects` fields so they can be routed apart from operational logs.

use tracing::Level;

/// Audit logger for controller events.
#[derive(Debug, Clone)]
pub struct ControllerAuditLogger {
    component: String,
}

impl Default for ControllerAuditLogger {
    fn default() -> Self {
        Self::new("kcsync-controller")
    }
}

impl ControllerAuditLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    fn log(&self, level: Level, message: String, objects: &[&str]) {
        match level {
            Level::ERROR => {
                tracing::error!(target: "audit", component = %self.component, objects = ?objects, "{}", message)
            }
            Level::WARN => {
                tracing::warn!(target: "audit", component = %self.component, objects = ?objects, "{}", message)
            }
            _ => {
                tracing::info!(target: "audit", component = %self.component, objects = ?objects, "{}", message)
            }
        }
    }

    pub fn started(&self, instance: &str, workers: usize) {
        self.log(
            Level::INFO,
            format!("Controller started with {} workers", workers),
            &[instance],
        );
    }

    pub fn connector_created(&self, resource: &str, connector: &str, endpoint: &str) {
        self.log(
            Level::INFO,
            format!("Connector created: {} at {}", connector, endpoint),
            &[resource, connector],
        );
    }

    pub fn connector_adopted(&self, resource: &str, connector: &str, endpoint: &str) {
        self.log(
            Level::INFO,
            format!("Connector already exists: {} at {}", connector, endpoint),
            &[resource, connector],
        );
    }

    pub fn connector_updated(&self, resource: &str, connector: &str, drift: &[String]) {
        self.log(
            Level::INFO,
            format!("Connector config updated: {} ({})", connector, drift.join(", ")),
            &[resource, connector],
        );
    }

    pub fn connector_deleted(&self, resource: &str, connector: &str) {
        self.log(
            Level::INFO,
            format!("Connector deleted: {}", connector),
            &[resource, connector],
        );
    }

    pub fn connector_orphaned(&self, resource: &str, connector: &str) {
        self.log(
            Level::WARN,
            format!("Connector orphaned, left on cluster: {}", connector),
            &[resource, connector],
        );
    }

    pub fn reconcile_failed(&self, resource: &str, error: &str) {
        self.log(
            Level::ERROR,
            format!("Reconcile failed: {}", error),
            &[resource],
        );
    }

    pub fn finalized(&self, resource: &str) {
        self.log(Level::INFO, format!("Resource finalized: {}", resource), &[resource]);
    }
}
