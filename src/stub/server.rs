//! Embedded stub HTTP server
//!
//! Owns the fixture registry and serves tool calls issued by the agent under
//! test. The listener runs on a background tokio task so the orchestration
//! flow can block on the agent while the agent calls back in; individual
//! connections are handled concurrently and resolved statelessly from the
//! registry.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::Path as FsPath;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, State},
    http::{Method, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
};
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};
use tracing::{debug, info, warn};

use super::registry::{FixtureRegistry, FixtureRule, MCP_SERVICE_PREFIX};
use super::value::normalize_params;
use crate::config::StubConfig;
use crate::{Error, Result};

/// How long `stop()` waits for the listener task to join.
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Stub server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No listener bound
    Stopped,
    /// `start()` in progress
    Starting,
    /// Listener bound and serving
    Running,
    /// `stop()` in progress
    Stopping,
}

/// Shared state handed to the request handlers.
struct StubState {
    registry: Arc<RwLock<FixtureRegistry>>,
    service_name: String,
}

/// Introspection snapshot for operator-facing reporting.
#[derive(Debug, Clone, Serialize)]
pub struct StubInfo {
    /// Whether the listener is live
    pub is_running: bool,
    /// Configured bind host
    pub host: String,
    /// Bound port (actual port when configured as 0)
    pub port: u16,
    /// Registered tool keys
    pub loaded_tools: Vec<String>,
    /// Total fixture count across all tools
    pub total_stubs: usize,
}

/// HTTP server answering tool calls from pre-recorded fixtures.
pub struct StubServer {
    config: StubConfig,
    registry: Arc<RwLock<FixtureRegistry>>,
    state: ServerState,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl StubServer {
    /// Create a stopped server with an empty registry.
    #[must_use]
    pub fn new(config: StubConfig) -> Self {
        Self {
            config,
            registry: Arc::new(RwLock::new(FixtureRegistry::new())),
            state: ServerState::Stopped,
            shutdown_tx: None,
            handle: None,
            local_addr: None,
        }
    }

    /// Register agent-level fixtures for one tool key (highest priority).
    pub fn load_agent_fixtures(&self, tool_key: &str, rules: Vec<FixtureRule>, base_dir: &FsPath) {
        self.registry
            .write()
            .register_agent_fixtures(tool_key, rules, base_dir);
    }

    /// Register per-test fixtures.
    pub fn load_test_fixtures(
        &self,
        stubs: &BTreeMap<String, Vec<FixtureRule>>,
        base_dir: &FsPath,
    ) {
        self.registry.write().register_test_fixtures(stubs, base_dir);
    }

    /// Drop all registered fixtures between runs.
    pub fn clear_fixtures(&self) {
        self.registry.write().clear();
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Whether the listener is live.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == ServerState::Running
    }

    /// The port actually bound, falling back to the configured one before
    /// `start()`. Useful with port 0 in tests.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.local_addr.map_or(self.config.port, |a| a.port())
    }

    /// Introspection snapshot.
    #[must_use]
    pub fn info(&self) -> StubInfo {
        let registry = self.registry.read();
        StubInfo {
            is_running: self.is_running(),
            host: self.config.host.clone(),
            port: self.port(),
            loaded_tools: registry.loaded_tools(),
            total_stubs: registry.total_fixtures(),
        }
    }

    /// Start the listener on a background task.
    ///
    /// Calling `start()` on a running server is a no-op reporting success;
    /// a bind failure leaves the server `Stopped` and is returned to the
    /// caller, who decides whether it is fatal.
    pub async fn start(&mut self) -> Result<()> {
        if self.state == ServerState::Running {
            warn!("Stub server is already running");
            return Ok(());
        }
        self.state = ServerState::Starting;

        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = match TcpListener::bind(&addr).await {
            Ok(l) => l,
            Err(e) => {
                self.state = ServerState::Stopped;
                return Err(Error::StubStart(format!("Failed to bind {addr}: {e}")));
            }
        };
        self.local_addr = listener.local_addr().ok();

        let state = Arc::new(StubState {
            registry: Arc::clone(&self.registry),
            service_name: self.config.service_name.clone(),
        });
        let app = create_router(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "Stub server terminated abnormally");
            }
        });

        self.shutdown_tx = Some(shutdown_tx);
        self.handle = Some(handle);
        self.state = ServerState::Running;

        info!(
            host = %self.config.host,
            port = self.port(),
            "Stub server started"
        );
        Ok(())
    }

    /// Stop the listener, waiting up to five seconds for the task to join.
    ///
    /// Stopping a stopped server is a no-op; a join timeout is logged as a
    /// warning rather than treated as an error.
    pub async fn stop(&mut self) {
        if self.state != ServerState::Running {
            return;
        }
        self.state = ServerState::Stopping;

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            match tokio::time::timeout(SHUTDOWN_TIMEOUT, handle).await {
                Ok(_) => info!("Stub server stopped"),
                Err(_) => warn!("Stub server listener did not join within timeout"),
            }
        }
        self.state = ServerState::Stopped;
    }
}

/// Build the dispatch router. Precedence is fixed: health check, MCP service
/// definitions, compiled path templates, single-segment tool keys, 404.
/// The fixed routes answer GET only; any other method falls through to the
/// dispatcher so the 404 body stays structured instead of a bare 405.
fn create_router(state: Arc<StubState>) -> Router {
    Router::new()
        .route("/health", get(health_handler).fallback(dispatch_handler))
        .route(
            "/api/mcp/service/{service_name}",
            get(mcp_service_handler).fallback(dispatch_handler),
        )
        .fallback(dispatch_handler)
        .layer(CatchPanicLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /health
async fn health_handler(State(state): State<Arc<StubState>>) -> Json<Value> {
    Json(json!({"status": "healthy", "service": state.service_name}))
}

/// GET /api/mcp/service/{name} - serve a catalog fixture back to the agent
/// as its service description.
async fn mcp_service_handler(
    State(state): State<Arc<StubState>>,
    Path(service_name): Path<String>,
) -> Response {
    let tool_key = format!("{MCP_SERVICE_PREFIX}{service_name}");
    debug!(tool = %tool_key, "MCP service definition request");

    let resolution = state.registry.read().resolve(&tool_key, &BTreeMap::new());
    match resolution {
        Some(r) => (StatusCode::OK, Json(r.payload)).into_response(),
        None => {
            warn!(service = %service_name, "No MCP service definition fixture");
            (
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("MCP service '{service_name}' not found")})),
            )
                .into_response()
        }
    }
}

/// Catch-all dispatcher: compiled path templates first, then the
/// single-segment backward-compatible form.
async fn dispatch_handler(
    State(state): State<Arc<StubState>>,
    method: Method,
    uri: Uri,
    body: Bytes,
) -> Response {
    let path = uri.path().to_string();
    let request_params = if method == Method::GET {
        query_params(uri.query())
    } else {
        body_params(&body)
    };

    // Compiled templates from catalogs and path_template declarations.
    let route_hit = state.registry.read().match_route(method.as_str(), &path);
    if let Some((tool_key, path_vars)) = route_hit {
        let mut params = request_params;
        // captured path variables win on key collision
        for (key, value) in path_vars {
            params.insert(key, Value::String(value));
        }
        info!(tool = %tool_key, method = %method, path = %path, "Tool request (template)");

        let normalized = normalize_params(&params);
        let resolution = state.registry.read().resolve(&tool_key, &normalized);
        return match resolution {
            Some(r) => (StatusCode::OK, Json(r.payload)).into_response(),
            None => (
                StatusCode::NOT_FOUND,
                Json(json!({"error": format!("No mock data found for tool '{tool_key}'")})),
            )
                .into_response(),
        };
    }

    // Single path segment is the tool key itself.
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if let [tool_key] = segments.as_slice() {
        info!(tool = %tool_key, method = %method, "Tool request (simple)");
        let normalized = normalize_params(&request_params);
        let resolution = state.registry.read().resolve(tool_key, &normalized);
        if let Some(r) = resolution {
            return (StatusCode::OK, Json(r.payload)).into_response();
        }
    }

    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("No stub route matched for {method} {path}")})),
    )
        .into_response()
}

/// Decode query-string pairs into a JSON parameter map.
fn query_params(query: Option<&str>) -> serde_json::Map<String, Value> {
    url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

/// Parse a JSON request body into a parameter map; non-object or malformed
/// bodies contribute no parameters.
fn body_params(body: &[u8]) -> serde_json::Map<String, Value> {
    if body.is_empty() {
        return serde_json::Map::new();
    }
    serde_json::from_slice::<Value>(body)
        .ok()
        .and_then(|v| v.as_object().cloned())
        .unwrap_or_default()
}
