//! In-memory store backing the manifest-driven controller and the tests.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use crate::credentials::{ConfigSource, ProviderConfig, Secret};
use crate::model::{ConnectorResource, ConnectorSpec, ResourceStatus};

use super::error::{Result, StoreError};
use super::event::StoreEvent;
use super::traits::ResourceStore;

const EVENT_CAPACITY: usize = 1024;

pub struct MemoryStore {
    connectors: RwLock<HashMap<String, ConnectorResource>>,
    provider_configs: RwLock<HashMap<String, ProviderConfig>>,
    secrets: RwLock<HashMap<String, Secret>>,
    events: broadcast::Sender<StoreEvent>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connectors: RwLock::new(HashMap::new()),
            provider_configs: RwLock::new(HashMap::new()),
            secrets: RwLock::new(HashMap::new()),
            events,
        }
    }

    fn emit(&self, event: StoreEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Declare or update a connector.
    ///
    /// The remote connector name is immutable: changing it on an existing
    /// resource is rejected, as is updating a resource that is being deleted.
    pub async fn apply(&self, name: &str, spec: ConnectorSpec) -> Result<()> {
        let mut connectors = self.connectors.write().await;
        match connectors.get_mut(name) {
            Some(existing) => {
                if existing.deletion_requested {
                    return Err(StoreError::Conflict(format!("{} is being deleted", name)));
                }
                if existing.spec.for_provider.name != spec.for_provider.name {
                    return Err(StoreError::Conflict(format!(
                        "connector name is immutable ({} -> {})",
                        existing.spec.for_provider.name, spec.for_provider.name
                    )));
                }
                if existing.spec == spec {
                    return Ok(());
                }
                existing.spec = spec;
            }
            None => {
                connectors.insert(name.to_string(), ConnectorResource::new(name, spec));
            }
        }
        drop(connectors);

        debug!(resource = %name, "Connector applied");
        self.emit(StoreEvent::ConnectorApplied {
            name: name.to_string(),
        });
        Ok(())
    }

    /// Mark a connector for deletion. Repeated requests are no-ops.
    pub async fn request_deletion(&self, name: &str) -> Result<()> {
        let mut connectors = self.connectors.write().await;
        let resource = connectors
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        if resource.deletion_requested {
            return Ok(());
        }
        resource.deletion_requested = true;
        drop(connectors);

        debug!(resource = %name, "Deletion requested");
        self.emit(StoreEvent::DeletionRequested {
            name: name.to_string(),
        });
        Ok(())
    }

    pub async fn apply_provider_config(&self, config: ProviderConfig) {
        let mut configs = self.provider_configs.write().await;
        if configs.get(&config.name) == Some(&config) {
            return;
        }
        configs.insert(config.name.clone(), config);
        drop(configs);
        self.emit(StoreEvent::ConnectionChanged);
    }

    pub async fn remove_provider_config(&self, name: &str) {
        if self.provider_configs.write().await.remove(name).is_some() {
            self.emit(StoreEvent::ConnectionChanged);
        }
    }

    pub async fn apply_secret(&self, secret: Secret) {
        let mut secrets = self.secrets.write().await;
        if secrets.get(&secret.name) == Some(&secret) {
            return;
        }
        secrets.insert(secret.name.clone(), secret);
        drop(secrets);
        self.emit(StoreEvent::ConnectionChanged);
    }

    pub async fn remove_secret(&self, name: &str) {
        if self.secrets.write().await.remove(name).is_some() {
            self.emit(StoreEvent::ConnectionChanged);
        }
    }

    pub async fn secret_names(&self) -> Vec<String> {
        self.secrets.read().await.keys().cloned().collect()
    }

    /// All connector resources, sorted by name.
    pub async fn snapshot(&self) -> Vec<ConnectorResource> {
        let mut all: Vec<ConnectorResource> =
            self.connectors.read().await.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

#[async_trait]
impl ResourceStore for MemoryStore {
    async fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.connectors.read().await.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn get(&self, name: &str) -> Result<Option<ConnectorResource>> {
        Ok(self.connectors.read().await.get(name).cloned())
    }

    async fn update_status(&self, name: &str, status: ResourceStatus) -> Result<()> {
        let mut connectors = self.connectors.write().await;
        let resource = connectors
            .get_mut(name)
            .ok_or_else(|| StoreError::NotFound(name.to_string()))?;
        resource.status = status;
        drop(connectors);

        self.emit(StoreEvent::StatusUpdated {
            name: name.to_string(),
        });
        Ok(())
    }

    async fn finalize(&self, name: &str) -> Result<()> {
        let mut connectors = self.connectors.write().await;
        let pending = match connectors.get(name) {
            Some(resource) => resource.deletion_requested,
            None => return Ok(()),
        };
        if !pending {
            return Err(StoreError::Conflict(format!(
                "{} has no pending deletion",
                name
            )));
        }
        connectors.remove(name);
        drop(connectors);

        self.emit(StoreEvent::Finalized {
            name: name.to_string(),
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

#[async_trait]
impl ConfigSource for MemoryStore {
    async fn provider_config(&self, name: &str) -> Result<Option<ProviderConfig>> {
        Ok(self.provider_configs.read().await.get(name).cloned())
    }

    async fn secret(&self, name: &str) -> Result<Option<Secret>> {
        Ok(self.secrets.read().await.get(name).cloned())
    }
}
