//! ResourceStore trait definition.
//!
//! The controller only talks to the desired-state provider through this
//! trait: read declared connectors, write status back, finalize deletions.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::model::{ConnectorResource, ResourceStatus};

use super::error::Result;
use super::event::StoreEvent;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Names of all declared connectors, including those being deleted.
    async fn list(&self) -> Result<Vec<String>>;

    /// Get a connector resource by name.
    async fn get(&self, name: &str) -> Result<Option<ConnectorResource>>;

    /// Overwrite the status of a connector resource.
    async fn update_status(&self, name: &str, status: ResourceStatus) -> Result<()>;

    /// Remove a resource whose deletion has completed.
    async fn finalize(&self, name: &str) -> Result<()>;

    /// Subscribe to change events.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}
