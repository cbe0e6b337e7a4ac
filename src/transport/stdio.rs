//! Stdio transport
//!
//! Line-delimited JSON-RPC over standard input/output, the framing MCP
//! clients expect when they spawn the server as a child process. Stdout
//! carries nothing but response envelopes; diagnostics go to stderr via
//! the tracing subscriber (configured in `main`). Responses are returned
//! inline, so `send` (broadcast) is unsupported here.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use super::{
    identity_from_params, RequestHandler, RequestMetadata, Transport, TransportError,
    TransportRequest,
};
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, RpcError};
use async_trait::async_trait;
use serde_json::Value;

pub struct StdioTransport {
    handler: RequestHandler,
    shutdown: watch::Sender<bool>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl StdioTransport {
    pub fn new(handler: RequestHandler) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            handler,
            shutdown,
            task: Mutex::new(None),
        }
    }

    /// Process one input line into an optional response line
    ///
    /// Parse errors produce a `-32700` envelope; notifications produce
    /// nothing. Split out from the read loop so it is testable without
    /// real stdio.
    pub async fn process_line(handler: &RequestHandler, line: &str) -> Option<String> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        let request: JsonRpcRequest = match serde_json::from_str(line) {
            Ok(req) => req,
            Err(e) => {
                let resp = JsonRpcResponse::error(
                    Value::Null,
                    RpcError::parse_error(format!("Parse error: {}", e)),
                );
                return serde_json::to_string(&resp).ok();
            }
        };

        let is_notification = request.is_notification();
        let identity = identity_from_params(&request.params);
        let req = TransportRequest::from_rpc(request, RequestMetadata::for_transport("stdio"))
            .with_identity(identity.0, identity.1, identity.2);

        let response = handler(req).await;
        if is_notification {
            return None;
        }
        serde_json::to_string(&response).ok()
    }

    async fn read_loop(handler: RequestHandler, mut shutdown: watch::Receiver<bool>) {
        let stdin = tokio::io::stdin();
        let mut lines = BufReader::new(stdin).lines();
        let mut stdout = tokio::io::stdout();

        loop {
            tokio::select! {
                maybe_line = lines.next_line() => {
                    let line = match maybe_line {
                        Ok(Some(line)) => line,
                        Ok(None) => {
                            tracing::info!("stdin closed, stdio transport draining");
                            break;
                        }
                        Err(e) => {
                            tracing::error!(error = %e, "stdin read failed");
                            break;
                        }
                    };

                    if let Some(out) = Self::process_line(&handler, &line).await {
                        if stdout.write_all(out.as_bytes()).await.is_err() {
                            break;
                        }
                        if stdout.write_all(b"\n").await.is_err() {
                            break;
                        }
                        let _ = stdout.flush().await;
                    }
                }
                _ = shutdown.changed() => {
                    tracing::info!("stdio transport stopping");
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl Transport for StdioTransport {
    fn name(&self) -> &'static str {
        "stdio"
    }

    async fn start(&self) -> Result<(), TransportError> {
        let handler = Arc::clone(&self.handler);
        let shutdown = self.shutdown.subscribe();
        let task = tokio::spawn(Self::read_loop(handler, shutdown));
        *self.task.lock().await = Some(task);
        tracing::info!("stdio transport started (line-delimited JSON-RPC)");
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        let _ = self.shutdown.send(true);
        if let Some(task) = self.task.lock().await.take() {
            let _ = task.await;
            Ok(())
        } else {
            Err(TransportError::NotRunning)
        }
    }
}
