//! Transport layer
//!
//! Transports accept connections, frame JSON-RPC 2.0 messages, and hand
//! each request to the kernel through an injected handler. Three variants:
//!
//! - [`stdio`] - line-delimited JSON-RPC on stdin/stdout, diagnostics on
//!   stderr, wired straight to the dispatcher
//! - [`http`] - `POST /mcp` + `GET /health` on axum, CORS and body limits
//! - [`ws`] - long-lived WebSocket channel with heartbeats and broadcast
//!
//! Every variant normalizes an incoming frame into a [`TransportRequest`]
//! carrying the caller identity harvested from its medium (headers on
//! HTTP, envelope fields elsewhere). Transports never leak handler panics
//! or parse failures to the peer as anything but JSON-RPC error envelopes.

pub mod http;
pub mod stdio;
pub mod ws;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::protocol::{JsonRpcRequest, JsonRpcResponse};

pub use http::HttpTransport;
pub use stdio::StdioTransport;
pub use ws::WebSocketTransport;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("broadcast is not supported on the {0} transport")]
    BroadcastUnsupported(&'static str),
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },
    #[error("transport is not running")]
    NotRunning,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Connection-level facts about a request
#[derive(Debug, Clone)]
pub struct RequestMetadata {
    pub transport: &'static str,
    pub user_agent: Option<String>,
    pub remote_addr: Option<String>,
}

impl RequestMetadata {
    pub fn for_transport(transport: &'static str) -> Self {
        Self {
            transport,
            user_agent: None,
            remote_addr: None,
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "transport": self.transport,
            "userAgent": self.user_agent,
            "remoteAddr": self.remote_addr,
        })
    }
}

/// A JSON-RPC frame normalized for the kernel
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub method: String,
    pub params: Option<Value>,
    pub id: Option<Value>,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub workflow_id: Option<String>,
    /// Conversational text for the orchestrator, harvested from
    /// `params.message` when present
    pub message: Option<String>,
    pub metadata: RequestMetadata,
}

impl TransportRequest {
    pub fn from_rpc(req: JsonRpcRequest, metadata: RequestMetadata) -> Self {
        let message = req
            .params
            .as_ref()
            .and_then(|p| p.get("message"))
            .and_then(Value::as_str)
            .map(String::from);
        Self {
            method: req.method,
            params: req.params,
            id: req.id,
            session_id: None,
            user_id: None,
            workflow_id: None,
            message,
            metadata,
        }
    }

    pub fn with_identity(
        mut self,
        session_id: Option<String>,
        user_id: Option<String>,
        workflow_id: Option<String>,
    ) -> Self {
        self.session_id = session_id;
        self.user_id = user_id;
        self.workflow_id = workflow_id;
        self
    }
}

/// Pull caller identity out of envelope params (stdio and WebSocket carry
/// it there; HTTP uses headers instead)
pub(crate) fn identity_from_params(
    params: &Option<Value>,
) -> (Option<String>, Option<String>, Option<String>) {
    let get = |key: &str| {
        params
            .as_ref()
            .and_then(|p| p.get(key))
            .and_then(Value::as_str)
            .map(String::from)
    };
    (get("sessionId"), get("userId"), get("workflowId"))
}

pub type DispatchFuture = Pin<Box<dyn Future<Output = JsonRpcResponse> + Send>>;

/// The kernel's dispatcher, injected into every transport
pub type RequestHandler = Arc<dyn Fn(TransportRequest) -> DispatchFuture + Send + Sync>;

/// Uniform transport interface
///
/// `stop` is graceful: stop accepting new connections, drain in-flight
/// requests, then close. `send` broadcasts to connected peers and is only
/// supported on the WebSocket transport.
#[async_trait]
pub trait Transport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn start(&self) -> Result<(), TransportError>;

    async fn stop(&self) -> Result<(), TransportError>;

    async fn send(&self, _data: Value) -> Result<(), TransportError> {
        Err(TransportError::BroadcastUnsupported(self.name()))
    }
}
