//! JSON status snapshot of all connector resources.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tracing::{debug, warn};

use crate::model::ConnectorResource;
use crate::store::{MemoryStore, ResourceStore, StoreEvent};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Snapshot<'a> {
    instance: &'a str,
    generated_at: chrono::DateTime<chrono::Utc>,
    connectors: &'a [ConnectorResource],
}

/// Write the current state of `store` to `path`, replacing it atomically.
pub async fn write_snapshot(store: &MemoryStore, instance: &str, path: &Path) -> std::io::Result<()> {
    let connectors = store.snapshot().await;
    let snapshot = Snapshot {
        instance,
        generated_at: chrono::Utc::now(),
        connectors: &connectors,
    };
    let json = serde_json::to_vec_pretty(&snapshot)?;

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, json).await?;
    tokio::fs::rename(&tmp, path).await
}

/// Rewrites the snapshot on every store change until shutdown.
pub struct SnapshotWriter {
    store: Arc<MemoryStore>,
    instance: String,
    path: PathBuf,
}

impl SnapshotWriter {
    pub fn new(store: Arc<MemoryStore>, instance: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            store,
            instance: instance.into(),
            path: path.into(),
        }
    }

    async fn write(&self) {
        match write_snapshot(&self.store, &self.instance, &self.path).await {
            Ok(()) => debug!("Status snapshot written to {}", self.path.display()),
            Err(e) => warn!("Failed to write status snapshot {}: {}", self.path.display(), e),
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut events = self.store.subscribe();
        self.write().await;
        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Ok(StoreEvent::ConnectionChanged) => {}
                    Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => self.write().await,
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        // Final state after in-flight cycles stopped.
        self.write().await;
    }
}
