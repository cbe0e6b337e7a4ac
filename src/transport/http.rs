//! HTTP transport
//!
//! One `POST /mcp` endpoint accepting a JSON-RPC envelope, plus
//! `GET /health` for liveness probes. Request identity is harvested from
//! the `x-session-id`, `x-user-id`, and `x-workflow-id` headers; the peer
//! address honors `x-forwarded-for` when `trust_proxy` is set. Handler
//! failures reply with an internal-error envelope and HTTP 500; one bad
//! request never affects another.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use super::{
    RequestHandler, RequestMetadata, Transport, TransportError, TransportRequest,
};
use crate::config::{CorsConfig, HttpOptions};
use crate::protocol::{codes, JsonRpcRequest, JsonRpcResponse, RpcError};
use async_trait::async_trait;

#[derive(Clone)]
struct HttpState {
    handler: RequestHandler,
    trust_proxy: bool,
}

pub struct HttpTransport {
    options: HttpOptions,
    handler: RequestHandler,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HttpTransport {
    pub fn new(options: HttpOptions, handler: RequestHandler) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            options,
            handler,
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Build the axum router; public so tests can drive it with `oneshot`
    pub fn router(handler: RequestHandler, options: &HttpOptions) -> Router {
        let state = HttpState {
            handler,
            trust_proxy: options.trust_proxy,
        };

        Router::new()
            .route("/mcp", post(handle_mcp_post))
            .route("/health", get(handle_health))
            .with_state(state)
            .layer(DefaultBodyLimit::max(options.max_body_size))
            .layer(cors_layer(&options.cors))
    }
}

fn cors_layer(config: &CorsConfig) -> CorsLayer {
    let mut layer = CorsLayer::new();

    layer = if config.origins.is_empty() {
        layer.allow_origin(AllowOrigin::from(Any))
    } else {
        let origins: Vec<HeaderValue> = config
            .origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        // Credentials are only valid with explicit origins.
        layer
            .allow_origin(AllowOrigin::list(origins))
            .allow_credentials(config.credentials)
    };

    layer = if config.methods.is_empty() {
        layer.allow_methods(AllowMethods::from(Any))
    } else {
        let methods: Vec<Method> = config
            .methods
            .iter()
            .filter_map(|m| m.parse().ok())
            .collect();
        layer.allow_methods(AllowMethods::list(methods))
    };

    layer = if config.headers.is_empty() {
        layer.allow_headers(AllowHeaders::from(Any))
    } else {
        let headers: Vec<HeaderName> = config
            .headers
            .iter()
            .filter_map(|h| h.parse().ok())
            .collect();
        layer.allow_headers(AllowHeaders::list(headers))
    };

    if let Some(max_age) = config.max_age_secs {
        layer = layer.max_age(Duration::from_secs(max_age));
    }

    layer
}

async fn handle_health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "transport": "http",
    }))
}

async fn handle_mcp_post(
    State(state): State<HttpState>,
    headers: HeaderMap,
    body: String,
) -> Response {
    let request: JsonRpcRequest = match serde_json::from_str(&body) {
        Ok(req) => req,
        Err(e) => {
            let resp = JsonRpcResponse::error(
                Value::Null,
                RpcError::parse_error(format!("Parse error: {}", e)),
            );
            return (StatusCode::INTERNAL_SERVER_ERROR, Json(resp)).into_response();
        }
    };

    let header_str = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(String::from)
    };

    let mut metadata = RequestMetadata::for_transport("http");
    metadata.user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .map(String::from);
    if state.trust_proxy {
        metadata.remote_addr = header_str("x-forwarded-for")
            .map(|chain| chain.split(',').next().unwrap_or("").trim().to_string());
    }

    let is_notification = request.is_notification();
    let req = TransportRequest::from_rpc(request, metadata).with_identity(
        header_str("x-session-id"),
        header_str("x-user-id"),
        header_str("x-workflow-id"),
    );

    tracing::debug!(method = %req.method, "HTTP request received");
    let response = (state.handler)(req).await;

    if is_notification {
        return (StatusCode::ACCEPTED, "").into_response();
    }

    // Internal failures surface as HTTP 500; protocol-level errors
    // (unknown method, bad params) stay 200 with an error envelope.
    let status = match &response.error {
        Some(err) if err.code == codes::INTERNAL_ERROR => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::OK,
    };
    (status, Json(response)).into_response()
}

#[async_trait]
impl Transport for HttpTransport {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn start(&self) -> Result<(), TransportError> {
        let addr = format!("{}:{}", self.options.host, self.options.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let app = Self::router(Arc::clone(&self.handler), &self.options);
        let mut shutdown = self.shutdown.subscribe();

        tracing::info!(addr = %addr, "HTTP transport listening");
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            });
            if let Err(e) = server.await {
                tracing::error!(error = %e, "HTTP server error");
            }
        });
        *self.task.lock().await = Some(task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
            tracing::info!("HTTP transport stopped");
            Ok(())
        } else {
            Err(TransportError::NotRunning)
        }
    }
}
