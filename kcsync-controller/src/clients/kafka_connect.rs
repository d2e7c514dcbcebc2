//! Client for the Kafka Connect REST management API.

use std::collections::BTreeMap;

use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::context::RequestContext;
use super::error::{ConnectError, Result};

/// Connector as returned by create, get and update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorInfo {
    pub name: String,
    #[serde(default)]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub tasks: Vec<TaskId>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub connector_type: Option<String>,
}

/// Task reference inside [`ConnectorInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskId {
    pub connector: String,
    pub task: u32,
}

/// Body of `POST /connectors`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateConnectorRequest {
    pub name: String,
    pub config: BTreeMap<String, String>,
}

/// Body of `GET /connectors/{name}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectorStatusResponse {
    pub name: String,
    pub connector: RawConnectorState,
    #[serde(default)]
    pub tasks: Vec<RawTaskState>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub connector_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawConnectorState {
    pub state: String,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawTaskState {
    pub id: u32,
    pub state: String,
    #[serde(default)]
    pub worker_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

/// Outcome of a delete call. Both variants are success.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    NotFound,
}

#[derive(Debug, Clone)]
struct BasicAuth {
    username: String,
    password: String,
}

/// Stateless Kafka Connect client.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ConnectClient {
    base_url: String,
    http: reqwest::Client,
    auth: Option<BasicAuth>,
}

impl ConnectClient {
    pub fn new(base_url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
            auth: None,
        }
    }

    /// Attach Basic credentials. Ignored unless both fields are non-empty.
    pub fn with_basic_auth(mut self, username: &str, password: &str) -> Self {
        self.auth = if !username.is_empty() && !password.is_empty() {
            Some(BasicAuth {
                username: username.to_string(),
                password: password.to_string(),
            })
        } else {
            None
        };
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Create a connector. An existing connector yields a 409
    /// [`ConnectError::Application`] (see [`ConnectError::is_conflict`]).
    pub async fn create(
        &self,
        ctx: &RequestContext,
        request: &CreateConnectorRequest,
    ) -> Result<ConnectorInfo> {
        debug!("Creating connector {} at {}", request.name, self.base_url);
        let url = self.url(&["connectors"])?;
        let body = encode(request)?;
        let (status, bytes) = self.send(ctx, Method::POST, url, Some(body)).await?;
        check_status(status, &bytes)?;
        decode(&bytes)
    }

    /// Get a connector by name. `Ok(None)` when it does not exist.
    pub async fn get(&self, ctx: &RequestContext, name: &str) -> Result<Option<ConnectorInfo>> {
        debug!("Getting connector {} from {}", name, self.base_url);
        let url = self.url(&["connectors", name])?;
        let (status, bytes) = self.send(ctx, Method::GET, url, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(status, &bytes)?;
        decode(&bytes).map(Some)
    }

    /// Replace a connector's configuration with `config`.
    pub async fn update_config(
        &self,
        ctx: &RequestContext,
        name: &str,
        config: &BTreeMap<String, String>,
    ) -> Result<ConnectorInfo> {
        debug!("Updating connector {} config at {}", name, self.base_url);
        let url = self.url(&["connectors", name, "config"])?;
        let body = encode(config)?;
        let (status, bytes) = self.send(ctx, Method::PUT, url, Some(body)).await?;
        if status == StatusCode::NOT_FOUND {
            return Err(ConnectError::NotFound(name.to_string()));
        }
        check_status(status, &bytes)?;
        decode(&bytes)
    }

    /// Delete a connector. Deleting an absent connector is not an error.
    pub async fn delete(&self, ctx: &RequestContext, name: &str) -> Result<DeleteOutcome> {
        debug!("Deleting connector {} at {}", name, self.base_url);
        let url = self.url(&["connectors", name])?;
        let (status, bytes) = self.send(ctx, Method::DELETE, url, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(DeleteOutcome::NotFound);
        }
        check_status(status, &bytes)?;
        Ok(DeleteOutcome::Deleted)
    }

    /// Get runtime status of a connector and its tasks.
    pub async fn get_status(
        &self,
        ctx: &RequestContext,
        name: &str,
    ) -> Result<Option<ConnectorStatusResponse>> {
        debug!("Getting connector {} status from {}", name, self.base_url);
        let url = self.url(&["connectors", name, "status"])?;
        let (status, bytes) = self.send(ctx, Method::GET, url, None).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(status, &bytes)?;
        decode(&bytes).map(Some)
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = Url::parse(&self.base_url).map_err(|e| {
            ConnectError::InvalidRequest(format!("invalid base URL {}: {}", self.base_url, e))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                ConnectError::InvalidRequest(format!("base URL {} cannot be a base", self.base_url))
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Send one request and read the whole body, bounded by the context.
    async fn send(
        &self,
        ctx: &RequestContext,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<(StatusCode, Vec<u8>)> {
        if ctx.is_cancelled() {
            return Err(ConnectError::Cancelled);
        }

        let mut request = self
            .http
            .request(method, url.clone())
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json");
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.username, Some(&auth.password));
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let timeout = ctx.call_timeout();
        let call = async move {
            let response = request.send().await?;
            let status = response.status();
            let bytes = response.bytes().await?;
            Ok::<_, reqwest::Error>((status, bytes.to_vec()))
        };

        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ConnectError::Cancelled),
            result = tokio::time::timeout(timeout, call) => match result {
                Err(_) => Err(ConnectError::Timeout(timeout)),
                Ok(Err(e)) if e.is_timeout() => Err(ConnectError::Timeout(timeout)),
                Ok(Err(e)) => Err(ConnectError::Transport {
                    url: url.to_string(),
                    source: e,
                }),
                Ok(Ok(response)) => Ok(response),
            },
        }
    }
}

fn check_status(status: StatusCode, body: &[u8]) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(ConnectError::Application {
            status: status.as_u16(),
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| ConnectError::InvalidRequest(e.to_string()))
}

fn decode<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    serde_json::from_slice(body).map_err(ConnectError::Decode)
}
