//! kcsync-controller: reconciles declared Kafka Connect connectors.
//!
//! This daemon:
//! - Loads Connector, ProviderConfig and Secret manifests from a directory
//! - Reconciles each connector against its Kafka Connect cluster
//! - Reports status and Ready/Synced conditions, optionally to a JSON file

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kcsync_controller::manifest::ManifestSource;
use kcsync_controller::snapshot::SnapshotWriter;
use kcsync_controller::{
    ClientFactory, ConnectorReconciler, Controller, ControllerAuditLogger, ControllerConfig,
    DiffEngine, MemoryStore, Registry, SourceResolver,
};

/// kcsync Controller
#[derive(Parser, Debug)]
#[command(name = "kcsync-controller", version, about)]
struct Args {
    /// Directory with *.json manifests
    #[arg(long, default_value = "/etc/kcsync/manifests")]
    manifests: PathBuf,

    /// Manifest re-read interval in seconds
    #[arg(long, default_value = "10")]
    manifest_interval: u64,

    /// Write a JSON status snapshot to this file on every change
    #[arg(long)]
    status_file: Option<PathBuf>,

    /// Instance name (defaults to hostname)
    #[arg(long)]
    instance: Option<String>,

    /// Concurrent reconcile workers
    #[arg(long, default_value = "4")]
    workers: usize,

    /// Per-request timeout in seconds
    #[arg(long, default_value = "30")]
    request_timeout: u64,

    /// TCP connect timeout in seconds
    #[arg(long, default_value = "10")]
    connect_timeout: u64,

    /// Requeue interval for in-sync connectors in seconds
    #[arg(long, default_value = "60")]
    poll_interval: u64,

    /// Initial retry delay in milliseconds
    #[arg(long, default_value = "1000")]
    backoff_min_ms: u64,

    /// Maximum retry delay in seconds
    #[arg(long, default_value = "300")]
    backoff_max: u64,

    /// Additional connector config keys to ignore when detecting drift (repeatable)
    #[arg(long = "ignore-key")]
    ignore_keys: Vec<String>,
}

impl Args {
    fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            request_timeout: Duration::from_secs(self.request_timeout),
            connect_timeout: Duration::from_secs(self.connect_timeout),
            poll_interval: Duration::from_secs(self.poll_interval),
            backoff_min: Duration::from_millis(self.backoff_min_ms),
            backoff_max: Duration::from_secs(self.backoff_max),
            extra_ignored_keys: self.ignore_keys.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kcsync_controller=info,reqwest=warn,hyper=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = args.controller_config();

    let instance = args.instance.clone().unwrap_or_else(|| {
        hostname::get()
            .map(|h| h.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "unknown".to_string())
    });

    info!("Starting kcsync-controller: {}", instance);
    info!("Manifests: {}", args.manifests.display());

    let registry = Arc::new(Registry::default());
    info!("Registered kinds: {}", registry.registered().join(", "));

    let store = Arc::new(MemoryStore::new());
    let mut manifests = ManifestSource::new(&args.manifests, registry, Arc::clone(&store));
    let report = manifests
        .sync()
        .await
        .context("Failed to load manifests")?;
    info!("Loaded {} connectors", report.connectors);

    let audit = Arc::new(ControllerAuditLogger::default());
    let clients =
        ClientFactory::new(config.connect_timeout).context("Failed to create HTTP client")?;
    let resolver = Arc::new(SourceResolver::new(Arc::clone(&store)));
    let diff = DiffEngine::default().with_ignored_keys(config.extra_ignored_keys.clone());
    info!(
        "Ignoring config keys in drift detection: {}",
        diff.ignored_keys().collect::<Vec<_>>().join(", ")
    );
    let reconciler = Arc::new(ConnectorReconciler::new(
        resolver,
        clients,
        diff,
        Arc::clone(&audit),
    ));

    audit.started(&instance, config.workers);
    let controller = Controller::new(Arc::clone(&store), reconciler, config, audit);

    // Create shutdown signal channel
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let controller_handle = tokio::spawn(controller.run(shutdown_rx.clone()));
    let manifest_handle = tokio::spawn(manifests.run(
        Duration::from_secs(args.manifest_interval),
        shutdown_rx.clone(),
    ));
    let snapshot_handle = args.status_file.clone().map(|path| {
        info!("Writing status snapshots to {}", path.display());
        let writer = SnapshotWriter::new(Arc::clone(&store), instance.clone(), path);
        tokio::spawn(writer.run(shutdown_rx.clone()))
    });

    // Wait for shutdown signal
    let ctrl_c = signal::ctrl_c();
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to install SIGTERM handler")?;

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = sigterm.recv() => info!("Received SIGTERM"),
    }

    let _ = shutdown_tx.send(true);

    let _ = controller_handle.await;
    let _ = manifest_handle.await;
    if let Some(handle) = snapshot_handle {
        let _ = handle.await;
    }

    info!("Shutdown complete");
    Ok(())
}
