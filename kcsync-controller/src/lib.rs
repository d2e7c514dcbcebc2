//! kcsync Controller - keeps Kafka Connect connectors in line with their
//! declared configuration.
//!
//! Each declared connector is reconciled in cycles: observe the connector on
//! the cluster, decide on at most one corrective action, perform it, and
//! report status and conditions back to the desired-state store.

pub mod audit;
pub mod backoff;
pub mod clients;
pub mod conditions;
pub mod config;
pub mod controller;
pub mod credentials;
pub mod diff;
pub mod manifest;
pub mod model;
pub mod queue;
pub mod reconciler;
pub mod registry;
pub mod snapshot;
pub mod status;
pub mod store;

pub use audit::ControllerAuditLogger;
pub use clients::{ClientFactory, ConnectClient, ConnectError, RequestContext};
pub use config::ControllerConfig;
pub use controller::Controller;
pub use credentials::{ConnectionResolver, SourceResolver};
pub use diff::DiffEngine;
pub use model::{ConnectorResource, ConnectorSpec, DesiredConnector, ResourceStatus};
pub use reconciler::{ConnectorReconciler, Reconciler};
pub use registry::Registry;
pub use store::{MemoryStore, ResourceStore};
