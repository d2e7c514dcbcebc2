//! Manifest directory source.
//!
//! Reads `*.json` files from a directory. Each file holds one document or an
//! array of documents:
//!
//! ```json
//! {"apiVersion": "kafkaconnect.kcsync.io/v1alpha1", "kind": "Connector",
//!  "metadata": {"name": "orders-sink"},
//!  "spec": {"forProvider": {"name": "sink1", "connectorClass": "FileStreamSink"}}}
//! ```
//!
//! The directory is the complete desired state: connectors that disappear
//! from it get deletion requested on the next sync.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::credentials::{ProviderConfig, ProviderConfigSpec, Secret};
use crate::model::ConnectorSpec;
use crate::registry::{Registry, ResourceKind};
use crate::store::{MemoryStore, StoreError};

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: unknown kind {api_version}/{kind}", .path.display())]
    UnknownKind {
        path: PathBuf,
        api_version: String,
        kind: String,
    },

    #[error("{}: invalid {kind} {name}: {source}", .path.display())]
    InvalidSpec {
        path: PathBuf,
        kind: ResourceKind,
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{}: document without metadata.name", .path.display())]
    MissingName { path: PathBuf },

    #[error("duplicate {kind} {name}")]
    Duplicate { kind: ResourceKind, name: String },
}

pub type Result<T> = std::result::Result<T, ManifestError>;

#[derive(Debug, Deserialize)]
struct Metadata {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Document {
    api_version: String,
    kind: String,
    metadata: Metadata,
    #[serde(default)]
    spec: serde_json::Value,
    #[serde(default)]
    string_data: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum FileContent {
    Many(Vec<Document>),
    One(Box<Document>),
}

/// Everything declared in a manifest directory.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ManifestSet {
    pub connectors: BTreeMap<String, ConnectorSpec>,
    pub provider_configs: BTreeMap<String, ProviderConfig>,
    pub secrets: BTreeMap<String, Secret>,
}

impl ManifestSet {
    fn insert(&mut self, registry: &Registry, path: &Path, doc: Document) -> Result<()> {
        let kind = registry
            .lookup(&doc.api_version, &doc.kind)
            .ok_or_else(|| ManifestError::UnknownKind {
                path: path.to_path_buf(),
                api_version: doc.api_version.clone(),
                kind: doc.kind.clone(),
            })?;
        let name = doc.metadata.name;
        if name.is_empty() {
            return Err(ManifestError::MissingName {
                path: path.to_path_buf(),
            });
        }
        let invalid = |source| ManifestError::InvalidSpec {
            path: path.to_path_buf(),
            kind,
            name: name.clone(),
            source,
        };

        let duplicate = match kind {
            ResourceKind::Connector => {
                let spec: ConnectorSpec = serde_json::from_value(doc.spec).map_err(invalid)?;
                self.connectors.insert(name.clone(), spec).is_some()
            }
            ResourceKind::ProviderConfig => {
                let spec: ProviderConfigSpec = serde_json::from_value(doc.spec).map_err(invalid)?;
                self.provider_configs
                    .insert(
                        name.clone(),
                        ProviderConfig {
                            name: name.clone(),
                            spec,
                        },
                    )
                    .is_some()
            }
            ResourceKind::Secret => self
                .secrets
                .insert(
                    name.clone(),
                    Secret {
                        name: name.clone(),
                        data: doc.string_data,
                    },
                )
                .is_some(),
        };

        if duplicate {
            return Err(ManifestError::Duplicate { kind, name });
        }
        Ok(())
    }
}

/// Parse one manifest file's content.
pub fn parse(registry: &Registry, path: &Path, content: &str, set: &mut ManifestSet) -> Result<()> {
    let parsed: FileContent =
        serde_json::from_str(content).map_err(|source| ManifestError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let docs = match parsed {
        FileContent::Many(docs) => docs,
        FileContent::One(doc) => vec![*doc],
    };
    for doc in docs {
        set.insert(registry, path, doc)?;
    }
    Ok(())
}

/// Load every `*.json` file in `dir`, in file name order.
pub async fn load_dir(registry: &Registry, dir: &Path) -> Result<ManifestSet> {
    let io_err = |source| ManifestError::Io {
        path: dir.to_path_buf(),
        source,
    };
    let mut entries = tokio::fs::read_dir(dir).await.map_err(io_err)?;
    let mut files = Vec::new();
    while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    let mut set = ManifestSet::default();
    for path in files {
        let content =
            tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| ManifestError::Io {
                    path: path.clone(),
                    source,
                })?;
        parse(registry, &path, &content, &mut set)?;
    }
    Ok(set)
}

/// Outcome of one [`ManifestSource::sync`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SyncReport {
    pub connectors: usize,
    pub deletions: usize,
    pub rejected: usize,
}

/// Feeds a manifest directory into a [`MemoryStore`].
pub struct ManifestSource {
    dir: PathBuf,
    registry: Arc<Registry>,
    store: Arc<MemoryStore>,
    connectors: HashSet<String>,
    provider_configs: HashSet<String>,
    secrets: HashSet<String>,
}

impl ManifestSource {
    pub fn new(dir: impl Into<PathBuf>, registry: Arc<Registry>, store: Arc<MemoryStore>) -> Self {
        Self {
            dir: dir.into(),
            registry,
            store,
            connectors: HashSet::new(),
            provider_configs: HashSet::new(),
            secrets: HashSet::new(),
        }
    }

    /// Re-read the directory and apply the difference to the store.
    ///
    /// A directory that fails to load leaves the store untouched.
    pub async fn sync(&mut self) -> Result<SyncReport> {
        let set = load_dir(&self.registry, &self.dir).await?;
        let mut report = SyncReport::default();

        for (name, secret) in &set.secrets {
            self.store.apply_secret(secret.clone()).await;
            self.secrets.insert(name.clone());
        }
        for name in stale(&self.secrets, set.secrets.keys()) {
            self.store.remove_secret(&name).await;
            self.secrets.remove(&name);
        }

        for (name, config) in &set.provider_configs {
            self.store.apply_provider_config(config.clone()).await;
            self.provider_configs.insert(name.clone());
        }
        for name in stale(&self.provider_configs, set.provider_configs.keys()) {
            self.store.remove_provider_config(&name).await;
            self.provider_configs.remove(&name);
        }

        for (name, spec) in &set.connectors {
            match self.store.apply(name, spec.clone()).await {
                Ok(()) => {
                    self.connectors.insert(name.clone());
                    report.connectors += 1;
                }
                Err(e) => {
                    warn!("Rejected connector {}: {}", name, e);
                    report.rejected += 1;
                }
            }
        }
        for name in stale(&self.connectors, set.connectors.keys()) {
            match self.store.request_deletion(&name).await {
                Ok(()) | Err(StoreError::NotFound(_)) => {
                    info!("Connector {} removed from manifests, deleting", name);
                    report.deletions += 1;
                }
                Err(e) => warn!("Failed to request deletion of {}: {}", name, e),
            }
            self.connectors.remove(&name);
        }

        debug!(
            "Manifest sync: {} connectors, {} deletions, {} rejected",
            report.connectors, report.deletions, report.rejected
        );
        Ok(report)
    }

    /// Sync every `interval` until shutdown is signalled.
    pub async fn run(mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync().await {
                        warn!("Manifest sync failed: {}", e);
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        debug!("Manifest source stopping");
                        return;
                    }
                }
            }
        }
    }
}

fn stale<'a>(known: &HashSet<String>, current: impl Iterator<Item = &'a String>) -> Vec<String> {
    let current: HashSet<&String> = current.collect();
    let mut gone: Vec<String> = known
        .iter()
        .filter(|name| !current.contains(name))
        .cloned()
        .collect();
    gone.sort();
    gone
}
