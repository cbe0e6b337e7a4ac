//! WebSocket transport
//!
//! A long-lived bidirectional channel. Each connection gets an opaque
//! connection id and a `{type:"welcome"}` greeting; thereafter every text
//! frame is parsed as a JSON-RPC envelope (parse errors answered with
//! `-32700`). A heartbeat task pings every connection on an interval and
//! terminates those that fail to pong between two beats. `max_connections`
//! is enforced with close code 1013; shutdown closes every socket with
//! 1001. `send` broadcasts raw JSON to all open sockets, optionally
//! narrowed by a connection-id predicate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::{
    identity_from_params, RequestHandler, RequestMetadata, Transport, TransportError,
    TransportRequest,
};
use crate::config::WebSocketOptions;
use crate::protocol::{JsonRpcRequest, JsonRpcResponse, RpcError};
use async_trait::async_trait;

/// 1013: try again later (capacity)
const CLOSE_TRY_AGAIN_LATER: u16 = 1013;
/// 1001: going away (shutdown)
const CLOSE_GOING_AWAY: u16 = 1001;

struct ConnectionHandle {
    tx: mpsc::UnboundedSender<Message>,
    pong_seen: Arc<AtomicBool>,
}

type ConnMap = Arc<RwLock<HashMap<Uuid, ConnectionHandle>>>;

#[derive(Clone)]
struct WsState {
    handler: RequestHandler,
    connections: ConnMap,
    max_connections: Option<usize>,
}

pub struct WebSocketTransport {
    options: WebSocketOptions,
    handler: RequestHandler,
    connections: ConnMap,
    shutdown: watch::Sender<bool>,
    server_task: Mutex<Option<JoinHandle<()>>>,
    heartbeat_task: Mutex<Option<JoinHandle<()>>>,
}

impl WebSocketTransport {
    pub fn new(options: WebSocketOptions, handler: RequestHandler) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            options,
            handler,
            connections: Arc::new(RwLock::new(HashMap::new())),
            shutdown,
            server_task: Mutex::new(None),
            heartbeat_task: Mutex::new(None),
        }
    }

    /// Open connections right now
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Broadcast to connections selected by the predicate
    pub async fn send_filtered<F>(&self, data: Value, filter: F) -> Result<(), TransportError>
    where
        F: Fn(&Uuid) -> bool,
    {
        let text = data.to_string();
        let connections = self.connections.read().await;
        for (id, conn) in connections.iter() {
            if filter(id) {
                let _ = conn.tx.send(Message::Text(text.clone()));
            }
        }
        Ok(())
    }

    fn router(state: WsState, path: &str) -> Router {
        Router::new().route(path, get(ws_upgrade)).with_state(state)
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state))
}

async fn handle_connection(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    // Capacity gate: refuse excess sockets with 1013 before registering.
    if let Some(max) = state.max_connections {
        if state.connections.read().await.len() >= max {
            tracing::warn!(max, "Connection limit reached, refusing socket");
            let _ = sender
                .send(Message::Close(Some(CloseFrame {
                    code: CLOSE_TRY_AGAIN_LATER,
                    reason: "server at capacity".into(),
                })))
                .await;
            return;
        }
    }

    let connection_id = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    let pong_seen = Arc::new(AtomicBool::new(true));

    state.connections.write().await.insert(
        connection_id,
        ConnectionHandle {
            tx: tx.clone(),
            pong_seen: Arc::clone(&pong_seen),
        },
    );
    tracing::info!(connection = %connection_id, "WebSocket connection opened");

    let _ = tx.send(Message::Text(
        json!({
            "type": "welcome",
            "connectionId": connection_id,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })
        .to_string(),
    ));

    // Forward queued frames onto the socket
    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let handler = Arc::clone(&state.handler);
    let reply_tx = tx.clone();
    let recv_pong = Arc::clone(&pong_seen);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    if let Some(reply) = process_frame(&handler, &text).await {
                        // A dropped peer makes this a no-op.
                        let _ = reply_tx.send(Message::Text(reply));
                    }
                }
                Message::Pong(_) => {
                    recv_pong.store(true, Ordering::SeqCst);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = (&mut send_task) => recv_task.abort(),
        _ = (&mut recv_task) => send_task.abort(),
    }

    state.connections.write().await.remove(&connection_id);
    tracing::info!(connection = %connection_id, "WebSocket connection closed");
}

/// Parse and dispatch one text frame; `None` means no reply is due
async fn process_frame(handler: &RequestHandler, text: &str) -> Option<String> {
    let request: JsonRpcRequest = match serde_json::from_str(text) {
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
    let req = TransportRequest::from_rpc(request, RequestMetadata::for_transport("websocket"))
        .with_identity(identity.0, identity.1, identity.2);

    let response = handler(req).await;
    if is_notification {
        return None;
    }
    serde_json::to_string(&response).ok()
}

/// One heartbeat pass: terminate connections that missed a pong, ping the
/// rest. Returns the ids that were dropped.
async fn heartbeat_sweep(connections: &ConnMap) -> Vec<Uuid> {
    let mut stale = Vec::new();
    {
        let conns = connections.read().await;
        for (id, conn) in conns.iter() {
            if conn.pong_seen.swap(false, Ordering::SeqCst) {
                let _ = conn.tx.send(Message::Ping(Vec::new()));
            } else {
                stale.push(*id);
            }
        }
    }
    if !stale.is_empty() {
        let mut conns = connections.write().await;
        for id in &stale {
            if let Some(conn) = conns.remove(id) {
                let _ = conn.tx.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: "heartbeat timeout".into(),
                })));
                tracing::warn!(connection = %id, "Heartbeat missed, terminating connection");
            }
        }
    }
    stale
}

#[async_trait]
impl Transport for WebSocketTransport {
    fn name(&self) -> &'static str {
        "websocket"
    }

    async fn start(&self) -> Result<(), TransportError> {
        let addr = format!("{}:{}", self.options.host, self.options.port);
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|source| TransportError::Bind {
                addr: addr.clone(),
                source,
            })?;

        let state = WsState {
            handler: Arc::clone(&self.handler),
            connections: Arc::clone(&self.connections),
            max_connections: self.options.max_connections,
        };
        let app = Self::router(state, &self.options.path);
        let mut shutdown = self.shutdown.subscribe();

        tracing::info!(addr = %addr, path = %self.options.path, "WebSocket transport listening");
        let server_task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown.changed().await;
            });
            if let Err(e) = server.await {
                tracing::error!(error = %e, "WebSocket server error");
            }
        });

        let connections = Arc::clone(&self.connections);
        let interval = self.options.heartbeat_interval;
        let mut heartbeat_shutdown = self.shutdown.subscribe();
        let heartbeat_task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        heartbeat_sweep(&connections).await;
                    }
                    _ = heartbeat_shutdown.changed() => break,
                }
            }
        });

        *self.server_task.lock().await = Some(server_task);
        *self.heartbeat_task.lock().await = Some(heartbeat_task);
        Ok(())
    }

    async fn stop(&self) -> Result<(), TransportError> {
        // Close every socket with 1001 before tearing the listener down.
        {
            let mut conns = self.connections.write().await;
            for (_, conn) in conns.drain() {
                let _ = conn.tx.send(Message::Close(Some(CloseFrame {
                    code: CLOSE_GOING_AWAY,
                    reason: "server shutting down".into(),
                })));
            }
        }
        let _ = self.shutdown.send(true);

        let server = self.server_task.lock().await.take();
        let heartbeat = self.heartbeat_task.lock().await.take();
        match (server, heartbeat) {
            (None, None) => Err(TransportError::NotRunning),
            (server, heartbeat) => {
                if let Some(task) = heartbeat {
                    let _ = task.await;
                }
                if let Some(task) = server {
                    let _ = task.await;
                }
                tracing::info!("WebSocket transport stopped");
                Ok(())
            }
        }
    }

    /// Broadcast raw JSON to every open socket
    async fn send(&self, data: Value) -> Result<(), TransportError> {
        self.send_filtered(data, |_| true).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn echo_handler() -> RequestHandler {
        Arc::new(|req| {
            Box::pin(async move {
                JsonRpcResponse::success(
                    req.id.unwrap_or(Value::Null),
                    json!({"method": req.method, "workflowId": req.workflow_id}),
                )
            })
        })
    }

    fn register(connections: &ConnMap) -> (Uuid, mpsc::UnboundedReceiver<Message>, Arc<AtomicBool>) {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let pong_seen = Arc::new(AtomicBool::new(true));
        let handle = ConnectionHandle {
            tx,
            pong_seen: Arc::clone(&pong_seen),
        };
        let connections = Arc::clone(connections);
        tokio::spawn(async move {
            connections.write().await.insert(id, handle);
        });
        (id, rx, pong_seen)
    }

    #[tokio::test]
    async fn frame_dispatch_and_parse_errors() {
        let handler = echo_handler();

        let reply = process_frame(
            &handler,
            r#"{"jsonrpc":"2.0","id":4,"method":"tools/list","params":{"workflowId":"story"}}"#,
        )
        .await
        .unwrap();
        let json: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(json["id"], 4);
        assert_eq!(json["result"]["workflowId"], "story");

        let reply = process_frame(&handler, "garbage{").await.unwrap();
        let json: Value = serde_json::from_str(&reply).unwrap();
        assert_eq!(json["error"]["code"], -32700);

        assert!(process_frame(
            &handler,
            r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#
        )
        .await
        .is_none());
    }

    #[tokio::test]
    async fn heartbeat_pings_live_and_drops_silent_connections() {
        let connections: ConnMap = Arc::new(RwLock::new(HashMap::new()));

        let (live_id, mut live_rx, live_pong) = register(&connections);
        let (dead_id, mut dead_rx, dead_pong) = register(&connections);
        tokio::task::yield_now().await;

        // First sweep: both were "seen" at connect time, both get pinged.
        let dropped = heartbeat_sweep(&connections).await;
        assert!(dropped.is_empty());
        assert!(matches!(live_rx.recv().await, Some(Message::Ping(_))));
        assert!(matches!(dead_rx.recv().await, Some(Message::Ping(_))));

        // Only the live one pongs back.
        live_pong.store(true, Ordering::SeqCst);
        assert!(!dead_pong.load(Ordering::SeqCst));

        let dropped = heartbeat_sweep(&connections).await;
        assert_eq!(dropped, vec![dead_id]);
        match dead_rx.recv().await {
            Some(Message::Close(Some(frame))) => assert_eq!(frame.code, CLOSE_GOING_AWAY),
            other => panic!("expected close frame, got {:?}", other),
        }
        assert!(connections.read().await.contains_key(&live_id));
        assert!(!connections.read().await.contains_key(&dead_id));
    }

    #[tokio::test]
    async fn broadcast_honors_filter() {
        let handler = echo_handler();
        let transport = WebSocketTransport::new(WebSocketOptions::default(), handler);

        let (first, mut first_rx, _) = register(&transport.connections);
        let (_, mut second_rx, _) = register(&transport.connections);
        tokio::task::yield_now().await;

        transport
            .send_filtered(json!({"event": "only-first"}), |id| *id == first)
            .await
            .unwrap();
        transport.send(json!({"event": "everyone"})).await.unwrap();

        match first_rx.recv().await {
            Some(Message::Text(text)) => assert!(text.contains("only-first")),
            other => panic!("expected text frame, got {:?}", other),
        }
        match second_rx.recv().await {
            Some(Message::Text(text)) => assert!(text.contains("everyone")),
            other => panic!("expected broadcast frame, got {:?}", other),
        }
    }
}
