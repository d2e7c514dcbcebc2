//! Clients for remote management APIs.
//!
//! - Kafka Connect: connector lifecycle and status over REST

pub mod context;
pub mod error;
pub mod kafka_connect;

use std::time::Duration;

pub use context::{RequestContext, DEFAULT_TIMEOUT};
pub use error::{ConnectError, ErrorClass};
pub use kafka_connect::{
    ConnectClient, ConnectorInfo, ConnectorStatusResponse, CreateConnectorRequest, DeleteOutcome,
    RawConnectorState, RawTaskState, TaskId,
};

use crate::credentials::{CredentialError, ResolvedConnection, TlsConfig};

/// Builds [`ConnectClient`]s for resolved connections.
///
/// Connections without custom TLS share one pooled `reqwest::Client`; the pool
/// is only read after construction.
#[derive(Debug, Clone)]
pub struct ClientFactory {
    shared: reqwest::Client,
    connect_timeout: Duration,
}

impl ClientFactory {
    pub fn new(connect_timeout: Duration) -> Result<Self, CredentialError> {
        let shared = reqwest::Client::builder()
            .connect_timeout(connect_timeout)
            .build()
            .map_err(|e| CredentialError::Tls(e.to_string()))?;
        Ok(Self {
            shared,
            connect_timeout,
        })
    }

    /// Client for one reconcile cycle against `conn`.
    pub fn client_for(&self, conn: &ResolvedConnection) -> Result<ConnectClient, CredentialError> {
        let http = if conn.tls.is_default() {
            self.shared.clone()
        } else {
            self.build_tls_client(&conn.tls)?
        };

        let client = ConnectClient::new(conn.endpoint.clone(), http);
        Ok(match &conn.basic_auth {
            Some(auth) => client.with_basic_auth(&auth.username, &auth.password),
            None => client,
        })
    }

    fn build_tls_client(&self, tls: &TlsConfig) -> Result<reqwest::Client, CredentialError> {
        let mut builder = reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .danger_accept_invalid_certs(tls.insecure_skip_verify);
        if let Some(pem) = &tls.ca_bundle {
            // rustls parses lazily and silently skips non-PEM input.
            if !pem.contains("-----BEGIN CERTIFICATE-----") {
                return Err(CredentialError::Tls(
                    "CA bundle contains no PEM certificate".to_string(),
                ));
            }
            let cert = reqwest::Certificate::from_pem(pem.as_bytes())
                .map_err(|e| CredentialError::Tls(format!("invalid CA bundle: {}", e)))?;
            builder = builder.add_root_certificate(cert);
        }
        builder
            .build()
            .map_err(|e| CredentialError::Tls(e.to_string()))
    }
}
