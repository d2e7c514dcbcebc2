//! Shared test utilities for kcsync-controller integration tests.
//!
//! `FakeConnect` serves the Kafka Connect connector REST endpoints from
//! memory. Responses can be scripted per route (`"POST /connectors"`,
//! `"GET /connectors/{name}/status"`, ...) to fail or stall once.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use kcsync_controller::model::{ConnectorSpec, DeletionPolicy, DesiredConnector};

#[derive(Default)]
struct FakeState {
    connectors: BTreeMap<String, BTreeMap<String, String>>,
    task_states: HashMap<String, Vec<String>>,
    requests: Vec<String>,
    failures: HashMap<String, (u16, String)>,
    delays: HashMap<String, Duration>,
    required_auth: Option<String>,
}

type Shared = Arc<Mutex<FakeState>>;

/// In-memory Kafka Connect REST server.
pub struct FakeConnect {
    pub addr: SocketAddr,
    state: Shared,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl FakeConnect {
    pub async fn spawn() -> Self {
        let state: Shared = Arc::new(Mutex::new(FakeState::default()));

        let router = Router::new()
            .route("/connectors", post(create_connector))
            .route(
                "/connectors/{name}",
                get(get_connector).delete(delete_connector),
            )
            .route("/connectors/{name}/config", put(update_config))
            .route("/connectors/{name}/status", get(get_status))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .expect("Server error");
        });

        Self {
            addr,
            state,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Every request seen so far, as `"METHOD /path"`.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Requests other than GET.
    pub fn mutations(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| !r.starts_with("GET "))
            .collect()
    }

    pub fn clear_requests(&self) {
        self.state.lock().unwrap().requests.clear();
    }

    /// Store a connector as if it had been created earlier. The worker adds
    /// `name` to the config, like Kafka Connect does.
    pub fn insert_connector(&self, name: &str, config: &[(&str, &str)]) {
        let mut config: BTreeMap<String, String> = config
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        config.insert("name".to_string(), name.to_string());
        self.state
            .lock()
            .unwrap()
            .connectors
            .insert(name.to_string(), config);
    }

    pub fn connector_config(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.state.lock().unwrap().connectors.get(name).cloned()
    }

    pub fn has_connector(&self, name: &str) -> bool {
        self.connector_config(name).is_some()
    }

    /// Override the task states reported for `name`.
    pub fn set_task_states(&self, name: &str, states: &[&str]) {
        self.state.lock().unwrap().task_states.insert(
            name.to_string(),
            states.iter().map(|s| s.to_string()).collect(),
        );
    }

    /// Answer the next request on `route` with `status`.
    pub fn fail_next(&self, route: &str, status: u16, body: &str) {
        self.state
            .lock()
            .unwrap()
            .failures
            .insert(route.to_string(), (status, body.to_string()));
    }

    /// Stall the next request on `route` for `delay`.
    pub fn delay_next(&self, route: &str, delay: Duration) {
        self.state
            .lock()
            .unwrap()
            .delays
            .insert(route.to_string(), delay);
    }

    /// Reject requests without this exact `Authorization` header.
    pub fn require_auth(&self, header: &str) {
        self.state.lock().unwrap().required_auth = Some(header.to_string());
    }

    pub fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

fn error_body(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(json!({"error_code": status.as_u16(), "message": message})),
    )
        .into_response()
}

/// Record the request and apply scripted auth checks, failures and delays.
async fn intercept(state: &Shared, route: String, headers: &HeaderMap) -> Option<Response> {
    let (failure, delay) = {
        let mut s = state.lock().unwrap();
        s.requests.push(route.clone());
        if let Some(required) = &s.required_auth {
            let sent = headers
                .get("authorization")
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default();
            if sent != required {
                return Some(error_body(StatusCode::UNAUTHORIZED, "Unauthorized"));
            }
        }
        (s.failures.remove(&route), s.delays.remove(&route))
    };

    if let Some(delay) = delay {
        tokio::time::sleep(delay).await;
    }
    failure.map(|(status, body)| {
        (
            StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            body,
        )
            .into_response()
    })
}

fn info(name: &str, config: &BTreeMap<String, String>) -> Value {
    let tasks: usize = config
        .get("tasks.max")
        .and_then(|t| t.parse().ok())
        .unwrap_or(1);
    json!({
        "name": name,
        "config": config,
        "tasks": (0..tasks).map(|i| json!({"connector": name, "task": i})).collect::<Vec<_>>(),
        "type": "sink",
    })
}

async fn create_connector(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(resp) = intercept(&state, "POST /connectors".to_string(), &headers).await {
        return resp;
    }
    let Some(name) = body["name"].as_str().map(str::to_string) else {
        return error_body(StatusCode::BAD_REQUEST, "missing name");
    };
    let mut config: BTreeMap<String, String> =
        serde_json::from_value(body["config"].clone()).unwrap_or_default();
    config.insert("name".to_string(), name.clone());

    let mut s = state.lock().unwrap();
    if s.connectors.contains_key(&name) {
        return error_body(
            StatusCode::CONFLICT,
            &format!("Connector {} already exists", name),
        );
    }
    s.connectors.insert(name.clone(), config.clone());
    (StatusCode::CREATED, Json(info(&name, &config))).into_response()
}

async fn get_connector(
    State(state): State<Shared>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let route = format!("GET /connectors/{}", name);
    if let Some(resp) = intercept(&state, route, &headers).await {
        return resp;
    }
    match state.lock().unwrap().connectors.get(&name) {
        Some(config) => Json(info(&name, config)).into_response(),
        None => error_body(
            StatusCode::NOT_FOUND,
            &format!("Connector {} not found", name),
        ),
    }
}

async fn update_config(
    State(state): State<Shared>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(mut config): Json<BTreeMap<String, String>>,
) -> Response {
    let route = format!("PUT /connectors/{}/config", name);
    if let Some(resp) = intercept(&state, route, &headers).await {
        return resp;
    }
    let mut s = state.lock().unwrap();
    if !s.connectors.contains_key(&name) {
        return error_body(
            StatusCode::NOT_FOUND,
            &format!("Connector {} not found", name),
        );
    }
    config.insert("name".to_string(), name.clone());
    s.connectors.insert(name.clone(), config.clone());
    Json(info(&name, &config)).into_response()
}

async fn delete_connector(
    State(state): State<Shared>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let route = format!("DELETE /connectors/{}", name);
    if let Some(resp) = intercept(&state, route, &headers).await {
        return resp;
    }
    match state.lock().unwrap().connectors.remove(&name) {
        Some(_) => StatusCode::NO_CONTENT.into_response(),
        None => error_body(
            StatusCode::NOT_FOUND,
            &format!("Connector {} not found", name),
        ),
    }
}

async fn get_status(
    State(state): State<Shared>,
    Path(name): Path<String>,
    headers: HeaderMap,
) -> Response {
    let route = format!("GET /connectors/{}/status", name);
    if let Some(resp) = intercept(&state, route, &headers).await {
        return resp;
    }
    let s = state.lock().unwrap();
    let Some(config) = s.connectors.get(&name) else {
        return error_body(
            StatusCode::NOT_FOUND,
            &format!("Connector {} not found", name),
        );
    };
    let tasks_max: usize = config
        .get("tasks.max")
        .and_then(|t| t.parse().ok())
        .unwrap_or(1);
    let states = s
        .task_states
        .get(&name)
        .cloned()
        .unwrap_or_else(|| vec!["RUNNING".to_string(); tasks_max]);

    let tasks: Vec<Value> = states
        .iter()
        .enumerate()
        .map(|(id, state)| {
            let mut task = json!({"id": id, "state": state, "worker_id": "connect-0:8083"});
            if state == "FAILED" {
                task["trace"] = json!("org.apache.kafka.connect.errors.ConnectException: boom");
            }
            task
        })
        .collect();

    Json(json!({
        "name": name,
        "connector": {"state": "RUNNING", "worker_id": "connect-0:8083"},
        "tasks": tasks,
        "type": "sink",
    }))
    .into_response()
}

/// A FileStreamSink connector spec pointing at `url`.
pub fn sink_spec(name: &str, url: &str) -> ConnectorSpec {
    ConnectorSpec {
        for_provider: DesiredConnector {
            name: name.to_string(),
            connector_class: "FileStreamSink".to_string(),
            tasks_max: 1,
            config: BTreeMap::from([
                ("topics".to_string(), "orders".to_string()),
                ("file".to_string(), "/tmp/orders.txt".to_string()),
            ]),
            kafka_connect_url: Some(url.to_string()),
        },
        provider_config_ref: None,
        deletion_policy: DeletionPolicy::Delete,
    }
}

/// Wire config matching [`sink_spec`], as stored by the fake.
pub const SINK_CONFIG: &[(&str, &str)] = &[
    ("connector.class", "FileStreamSink"),
    ("tasks.max", "1"),
    ("topics", "orders"),
    ("file", "/tmp/orders.txt"),
];

/// Poll `check` until it returns true or `timeout` elapses.
pub async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
