//! Reconciliation controller.
//!
//! Watches the resource store, feeds changed resources into a [`WorkQueue`]
//! and runs a bounded pool of workers over it. A resource is only ever held
//! by one worker, so its cycles are strictly sequential.

use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::audit::ControllerAuditLogger;
use crate::clients::RequestContext;
use crate::config::ControllerConfig;
use crate::queue::WorkQueue;
use crate::reconciler::{CycleResult, Reconciler};
use crate::store::{ResourceStore, StoreEvent};

pub struct Controller<S> {
    store: Arc<S>,
    reconciler: Arc<dyn Reconciler>,
    queue: Arc<WorkQueue>,
    config: ControllerConfig,
    audit: Arc<ControllerAuditLogger>,
}

impl<S: ResourceStore + 'static> Controller<S> {
    pub fn new(
        store: Arc<S>,
        reconciler: Arc<dyn Reconciler>,
        config: ControllerConfig,
        audit: Arc<ControllerAuditLogger>,
    ) -> Arc<Self> {
        let queue = WorkQueue::new(config.backoff_min, config.backoff_max);
        Arc::new(Self {
            store,
            reconciler,
            queue,
            config,
            audit,
        })
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    /// Run until `true` is published on `shutdown`.
    ///
    /// In-flight cycles are cancelled; nothing is written for them.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        // Subscribe before listing so no change falls between the two.
        let mut events = self.store.subscribe();
        self.enqueue_all().await;

        let workers: Vec<JoinHandle<()>> = (0..self.config.workers.max(1))
            .map(|id| {
                let controller = Arc::clone(&self);
                let shutdown = shutdown.clone();
                tokio::spawn(async move { controller.worker(id, shutdown).await })
            })
            .collect();
        info!("Controller running with {} workers", workers.len());

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(event) => self.handle_event(event).await,
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!("Missed {} store events, resyncing", missed);
                        self.enqueue_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Store event stream closed");
                        break;
                    }
                },
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Controller shutting down");
        self.queue.shut_down().await;
        for worker in workers {
            if let Err(e) = worker.await {
                error!("Worker task failed: {}", e);
            }
        }
    }

    async fn handle_event(&self, event: StoreEvent) {
        if let Some(name) = event.connector() {
            self.queue.add(name).await;
        } else if event == StoreEvent::ConnectionChanged {
            debug!("Connection material changed, requeueing all connectors");
            self.enqueue_all().await;
        }
        // Status writes and finalizations are our own; reacting to them would loop.
    }

    async fn enqueue_all(&self) {
        match self.store.list().await {
            Ok(names) => {
                for name in names {
                    self.queue.add(&name).await;
                }
            }
            Err(e) => error!("Failed to list resources: {}", e),
        }
    }

    async fn worker(&self, id: usize, shutdown: watch::Receiver<bool>) {
        debug!("Worker {} started", id);
        while let Some(key) = self.queue.get().await {
            let span = info_span!("reconcile", resource = %key, cycle_id = %Uuid::new_v4());
            self.process(&key, &shutdown).instrument(span).await;
            self.queue.done(&key).await;
        }
        debug!("Worker {} stopped", id);
    }

    /// One cycle for `key`, including the status write and the requeue.
    async fn process(&self, key: &str, shutdown: &watch::Receiver<bool>) {
        let resource = match self.store.get(key).await {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                debug!("Resource {} no longer exists", key);
                self.queue.forget(key).await;
                return;
            }
            Err(e) => {
                let delay = self.queue.add_backoff(key).await;
                warn!("Failed to load {}: {} (retry in {:?})", key, e, delay);
                return;
            }
        };

        let ctx = RequestContext::new(self.config.request_timeout).with_shutdown(shutdown.clone());
        let outcome = self.reconciler.reconcile(&resource, &ctx).await;

        match outcome.result {
            CycleResult::Cancelled => {
                debug!("Cycle for {} cancelled", key);
                return;
            }
            CycleResult::Gone => {
                match self.store.finalize(key).await {
                    Ok(()) => {
                        self.audit.finalized(key);
                        self.queue.forget(key).await;
                    }
                    Err(e) => {
                        let delay = self.queue.add_backoff(key).await;
                        warn!("Failed to finalize {}: {} (retry in {:?})", key, e, delay);
                    }
                }
                return;
            }
            CycleResult::Clean | CycleResult::Acted | CycleResult::Failed => {}
        }

        if outcome.status != resource.status {
            if let Err(e) = self.store.update_status(key, outcome.status).await {
                let delay = self.queue.add_backoff(key).await;
                warn!("Failed to write status of {}: {} (retry in {:?})", key, e, delay);
                return;
            }
        }

        match outcome.result {
            CycleResult::Clean => {
                self.queue.reset_backoff(key).await;
                self.queue.add_after(key, self.config.poll_interval).await;
            }
            CycleResult::Acted => {
                debug!("{:?} done for {}, confirming next cycle", outcome.action, key);
                self.queue.add_after(key, self.config.backoff_min).await;
            }
            _ => {
                let error = outcome.error.unwrap_or_default();
                self.audit.reconcile_failed(key, &error);
                let delay = self.queue.add_backoff(key).await;
                warn!("Reconcile of {} failed, retry in {:?}", key, delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, VecDeque};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    use crate::conditions::{Condition, ConditionType};
    use crate::model::{ConnectorResource, ConnectorSpec, DeletionPolicy, DesiredConnector};
    use crate::reconciler::{Action, CycleOutcome};
    use crate::store::MemoryStore;

    /// Replays a fixed sequence of cycle results.
    struct ScriptedReconciler {
        results: Mutex<VecDeque<CycleResult>>,
    }

    impl ScriptedReconciler {
        fn new(results: &[CycleResult]) -> Self {
            Self {
                results: Mutex::new(results.iter().copied().collect()),
            }
        }
    }

    #[async_trait]
    impl Reconciler for ScriptedReconciler {
        async fn reconcile(&self, resource: &ConnectorResource, _: &RequestContext) -> CycleOutcome {
            let result = self.results.lock().unwrap().pop_front().unwrap();
            let mut status = resource.status.clone();
            match result {
                CycleResult::Failed => {
                    status.conditions.set(Condition::reconcile_error(
                        "TransportError",
                        "request timed out after 30s",
                    ));
                    return CycleOutcome::failed(status, "request timed out after 30s");
                }
                CycleResult::Acted => status.conditions.set(Condition::reconcile_success()),
                _ => {}
            }
            CycleOutcome {
                result,
                action: Action::None,
                status,
                error: None,
            }
        }
    }

    fn spec() -> ConnectorSpec {
        ConnectorSpec {
            for_provider: DesiredConnector {
                name: "sink1".to_string(),
                connector_class: "FileStreamSink".to_string(),
                tasks_max: 1,
                config: BTreeMap::new(),
                kafka_connect_url: Some("http://connect:8083".to_string()),
            },
            provider_config_ref: None,
            deletion_policy: DeletionPolicy::Delete,
        }
    }

    async fn controller(results: &[CycleResult]) -> Arc<Controller<MemoryStore>> {
        let store = Arc::new(MemoryStore::new());
        store.apply("orders-sink", spec()).await.unwrap();
        let config = ControllerConfig {
            poll_interval: Duration::from_secs(60),
            backoff_min: Duration::from_secs(1),
            backoff_max: Duration::from_secs(300),
            ..Default::default()
        };
        Controller::new(
            store,
            Arc::new(ScriptedReconciler::new(results)),
            config,
            Arc::new(ControllerAuditLogger::default()),
        )
    }

    /// Run one cycle the way a worker does.
    async fn cycle(controller: &Controller<MemoryStore>, shutdown: &watch::Receiver<bool>) {
        let key = controller.queue.get().await.unwrap();
        controller.process(&key, shutdown).await;
        controller.queue.done(&key).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cycles_back_off_and_clean_cycle_resets() {
        let c = controller(&[
            CycleResult::Failed,
            CycleResult::Failed,
            CycleResult::Clean,
            CycleResult::Failed,
        ])
        .await;
        let (_tx, rx) = watch::channel(false);
        let q = c.queue();

        q.add("orders-sink").await;
        cycle(&c, &rx).await;
        assert_eq!(q.failures("orders-sink").await, 1);
        let status = c.store.get("orders-sink").await.unwrap().unwrap().status;
        assert_eq!(status.conditions.status(ConditionType::Synced), Some(false));

        // First retry after backoff_min.
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(q.len().await, 1);
        cycle(&c, &rx).await;
        assert_eq!(q.failures("orders-sink").await, 2);

        // Second retry waits twice as long.
        tokio::time::sleep(Duration::from_millis(1500)).await;
        assert!(q.is_empty().await);
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_eq!(q.len().await, 1);

        // A clean cycle resets the backoff and polls again later.
        cycle(&c, &rx).await;
        assert_eq!(q.failures("orders-sink").await, 0);
        tokio::time::sleep(Duration::from_secs(59)).await;
        assert!(q.is_empty().await);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(q.len().await, 1);

        // The next failure starts from backoff_min again.
        cycle(&c, &rx).await;
        assert_eq!(q.failures("orders-sink").await, 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(q.len().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_acted_cycle_requeues_without_backoff() {
        let c = controller(&[CycleResult::Failed, CycleResult::Acted]).await;
        let (_tx, rx) = watch::channel(false);
        let q = c.queue();

        q.add("orders-sink").await;
        cycle(&c, &rx).await;
        tokio::time::sleep(Duration::from_millis(1100)).await;
        cycle(&c, &rx).await;

        // Acting neither advances nor clears the failure count.
        assert_eq!(q.failures("orders-sink").await, 1);
        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert_eq!(q.len().await, 1);
    }

    #[tokio::test]
    async fn test_cancelled_cycle_schedules_nothing() {
        let c = controller(&[CycleResult::Cancelled]).await;
        let (_tx, rx) = watch::channel(false);
        let q = c.queue();

        q.add("orders-sink").await;
        cycle(&c, &rx).await;
        assert!(q.is_empty().await);
        assert_eq!(q.failures("orders-sink").await, 0);
        let status = c.store.get("orders-sink").await.unwrap().unwrap().status;
        assert!(status.conditions.is_empty());
    }
}
