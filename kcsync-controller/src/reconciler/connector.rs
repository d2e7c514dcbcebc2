//! Connector reconciler - reconciles declared connectors with Kafka Connect.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{decide, Action, CycleOutcome, CycleResult, Decision, ReconcileState, Reconciler};
use crate::audit::ControllerAuditLogger;
use crate::clients::{ClientFactory, ConnectClient, ConnectError, DeleteOutcome, RequestContext};
use crate::conditions::{Condition, ConditionType, REASON_ALREADY_EXISTS};
use crate::credentials::ConnectionResolver;
use crate::diff::DiffEngine;
use crate::model::{ConnectorResource, ConnectorStatus, ResourceStatus};
use crate::status::{readiness, translate, ObservedConnector};

/// What Observe saw on the cluster.
struct Observation {
    connector: Option<ObservedConnector>,
    /// Status read failure for a connector that exists. The connector config
    /// is still usable for the diff.
    status_error: Option<ConnectError>,
}

/// Result of the Act step when no error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Acted {
    Nothing,
    Created,
    AlreadyExists,
    Updated,
    Deleted,
    Orphaned,
}

/// Connector reconciler that interacts with Kafka Connect.
pub struct ConnectorReconciler {
    resolver: Arc<dyn ConnectionResolver>,
    clients: ClientFactory,
    diff: DiffEngine,
    audit: Arc<ControllerAuditLogger>,
}

impl ConnectorReconciler {
    pub fn new(
        resolver: Arc<dyn ConnectionResolver>,
        clients: ClientFactory,
        diff: DiffEngine,
        audit: Arc<ControllerAuditLogger>,
    ) -> Self {
        Self {
            resolver,
            clients,
            diff,
            audit,
        }
    }

    async fn observe(
        &self,
        client: &ConnectClient,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Observation, ConnectError> {
        let Some(info) = client.get(ctx, name).await? else {
            return Ok(Observation {
                connector: None,
                status_error: None,
            });
        };

        let (status, status_error) = match client.get_status(ctx, name).await {
            Ok(Some(raw)) => (Some(translate(&raw)), None),
            // Deleted between the two reads. Keep the old projection and let
            // the next cycle see it absent.
            Ok(None) => {
                warn!("Connector {} vanished before its status was read", name);
                (None, Some(ConnectError::NotFound(name.to_string())))
            }
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) => {
                warn!("Failed to get status of connector {}: {}", name, e);
                (None, Some(e))
            }
        };

        Ok(Observation {
            connector: Some(ObservedConnector::new(info, status)),
            status_error,
        })
    }

    async fn act(
        &self,
        client: &ConnectClient,
        ctx: &RequestContext,
        resource: &ConnectorResource,
        decision: &Decision,
        observed: Option<&ObservedConnector>,
    ) -> Result<Acted, ConnectError> {
        let desired = resource.desired();
        match decision.action {
            Action::None => Ok(Acted::Nothing),
            Action::Create => {
                info!("Creating connector {}", desired.name);
                match client.create(ctx, &desired.create_request()).await {
                    Ok(_) => {
                        self.audit
                            .connector_created(&resource.name, &desired.name, client.base_url());
                        Ok(Acted::Created)
                    }
                    // Observe just saw nothing. A duplicate-name answer means
                    // someone created it in between, unless the last cycle
                    // already concluded that and the connector is still absent.
                    Err(e) if e.is_already_exists() && !already_exists_before(resource) => {
                        self.audit
                            .connector_adopted(&resource.name, &desired.name, client.base_url());
                        Ok(Acted::AlreadyExists)
                    }
                    Err(e) => Err(e),
                }
            }
            Action::Update => {
                let drift: Vec<String> = observed
                    .map(|o| {
                        self.diff
                            .drift(desired, o)
                            .iter()
                            .map(ToString::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                info!("Updating connector {} config ({})", desired.name, drift.join(", "));
                client
                    .update_config(ctx, &desired.name, &desired.wire_config())
                    .await?;
                self.audit
                    .connector_updated(&resource.name, &desired.name, &drift);
                Ok(Acted::Updated)
            }
            Action::Delete => {
                info!("Deleting connector {}", desired.name);
                match client.delete(ctx, &desired.name).await? {
                    DeleteOutcome::Deleted => {
                        self.audit.connector_deleted(&resource.name, &desired.name)
                    }
                    DeleteOutcome::NotFound => {
                        debug!("Connector {} already absent", desired.name)
                    }
                }
                Ok(Acted::Deleted)
            }
            Action::Orphan => {
                self.audit.connector_orphaned(&resource.name, &desired.name);
                Ok(Acted::Orphaned)
            }
        }
    }
}

fn already_exists_before(resource: &ConnectorResource) -> bool {
    resource
        .status
        .conditions
        .get(ConditionType::Synced)
        .is_some_and(|c| c.reason == REASON_ALREADY_EXISTS)
}

/// Record a failure before Act could run (validation, resolution, observe).
fn early_failure(mut status: ResourceStatus, reason: &str, message: String) -> CycleOutcome {
    status
        .conditions
        .set(Condition::reconcile_error(reason, message.clone()));
    CycleOutcome::failed(status, message)
}

/// Project the observation into `status.at_provider` and the Ready condition.
fn report_observation(status: &mut ResourceStatus, state: ReconcileState, obs: &Observation) {
    match &obs.connector {
        None => status.at_provider = ConnectorStatus::default(),
        Some(o) => {
            // A failed status read keeps the previous projection.
            if let Some(s) = &o.status {
                status.at_provider = s.into();
            }
        }
    }

    match state {
        ReconcileState::Unobserved => status.conditions.set(Condition::creating()),
        ReconcileState::Deleting | ReconcileState::Gone => {
            status.conditions.set(Condition::deleting())
        }
        ReconcileState::UpToDate | ReconcileState::Drifted => {
            if let Some(s) = obs.connector.as_ref().and_then(|o| o.status.as_ref()) {
                status.conditions.set(readiness(s).condition());
            }
        }
    }
}

#[async_trait]
impl Reconciler for ConnectorReconciler {
    async fn reconcile(&self, resource: &ConnectorResource, ctx: &RequestContext) -> CycleOutcome {
        let status = resource.status.clone();
        let desired = resource.desired();

        // A broken spec must not block deletion.
        if !resource.deletion_requested {
            if let Err(e) = desired.validate() {
                warn!("Connector {} has an invalid spec: {}", resource.name, e);
                return early_failure(status, "ConfigurationError", e.to_string());
            }
        }

        let client = match self
            .resolver
            .resolve(resource)
            .await
            .and_then(|conn| self.clients.client_for(&conn))
        {
            Ok(client) => client,
            Err(e) => {
                warn!("Failed to resolve connection for {}: {}", resource.name, e);
                return early_failure(status, "ConfigurationError", e.to_string());
            }
        };

        let observation = match self.observe(&client, ctx, &desired.name).await {
            Ok(o) => o,
            Err(e) if e.is_cancelled() => return CycleOutcome::cancelled(status),
            Err(e) => {
                error!("Failed to observe connector {}: {}", desired.name, e);
                return early_failure(status, e.class().reason(), e.to_string());
            }
        };

        let state = ReconcileState::observed(
            resource.deletion_requested,
            observation.connector.is_some(),
        );
        let decision = decide(
            state,
            &resource.spec,
            observation.connector.as_ref(),
            &self.diff,
        );
        debug!(
            "Connector {} is {:?}, action {:?}",
            desired.name, decision.state, decision.action
        );

        let acted = self
            .act(
                &client,
                ctx,
                resource,
                &decision,
                observation.connector.as_ref(),
            )
            .await;
        if matches!(&acted, Err(e) if e.is_cancelled()) {
            return CycleOutcome::cancelled(status);
        }

        let mut status = status;
        report_observation(&mut status, decision.state, &observation);

        let previous_synced = status.conditions.status(ConditionType::Synced);
        let (result, final_state, error) = match (acted, &observation.status_error) {
            (Err(e), _) => {
                error!(
                    "Failed to {:?} connector {}: {}",
                    decision.action, desired.name, e
                );
                status
                    .conditions
                    .set(Condition::reconcile_error(e.class().reason(), e.to_string()));
                (CycleResult::Failed, decision.state, Some(e.to_string()))
            }
            // A confirmed delete finalizes the resource even when the
            // preceding status read failed.
            (Ok(Acted::Deleted | Acted::Orphaned), _) => {
                status.conditions.set(Condition::reconcile_success());
                status.at_provider = ConnectorStatus::default();
                (CycleResult::Gone, ReconcileState::Gone, None)
            }
            (Ok(_), Some(e)) => {
                status
                    .conditions
                    .set(Condition::reconcile_error(e.class().reason(), e.to_string()));
                (CycleResult::Failed, decision.state, Some(e.to_string()))
            }
            (Ok(Acted::Nothing), None) => {
                if previous_synced == Some(false) {
                    status.conditions.set(Condition::reconcile_success());
                }
                (CycleResult::Clean, decision.state, None)
            }
            (Ok(Acted::AlreadyExists), None) => {
                status.conditions.set(Condition::new(
                    ConditionType::Synced,
                    true,
                    REASON_ALREADY_EXISTS,
                    format!("connector {} already exists", desired.name),
                ));
                (CycleResult::Acted, decision.state, None)
            }
            (Ok(Acted::Created | Acted::Updated), None) => {
                status.conditions.set(Condition::reconcile_success());
                (CycleResult::Acted, decision.state, None)
            }
        };

        status.state = Some(final_state);
        CycleOutcome {
            result,
            action: decision.action,
            status,
            error,
        }
    }
}
