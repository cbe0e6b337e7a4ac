//! End-to-end dispatch tests over the HTTP transport
//!
//! Drives the full path a client sees: JSON-RPC envelope in over
//! `POST /mcp`, kernel dispatch with middleware, envelope out.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use manifold::config::HttpOptions;
use manifold::host::tool_builder::ToolBuilder;
use manifold::host::{HostError, Plugin, PluginMetadata, RegistrationContext};
use manifold::transport::HttpTransport;
use manifold::{McpServer, RateLimitMiddleware, ServerConfig, ValidationMiddleware};

/// The `demo` plugin of the acceptance scenarios: one `echo(text)` tool
struct DemoPlugin {
    meta: PluginMetadata,
}

impl DemoPlugin {
    fn new() -> Self {
        Self {
            meta: PluginMetadata::new("demo", "Demo", "1.0.0", "Echo demo plugin"),
        }
    }
}

#[async_trait]
impl Plugin for DemoPlugin {
    fn metadata(&self) -> &PluginMetadata {
        &self.meta
    }

    async fn initialize(&self, ctx: &RegistrationContext) -> Result<(), HostError> {
        ctx.register_tool(
            ToolBuilder::new("echo", "Echo the text back")
                .string_param("text", "Text to echo", true)
                .handler(|params, ctx| async move {
                    ctx.logger().debug("echo invoked");
                    Ok(params.get("text").cloned().unwrap_or(Value::Null))
                })
                .build()?,
        )
    }
}

async fn server_with(middleware: Vec<Arc<dyn manifold::Middleware>>) -> Arc<McpServer> {
    let mut builder = McpServer::builder(ServerConfig::default()).plugin(Arc::new(DemoPlugin::new()));
    for m in middleware {
        builder = builder.middleware(m);
    }
    builder.build().await.unwrap()
}

async fn post_mcp(server: &Arc<McpServer>, envelope: Value) -> (StatusCode, Value) {
    let app = HttpTransport::router(server.request_handler(), &HttpOptions::default());
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/mcp")
                .header("content-type", "application/json")
                .body(Body::from(envelope.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 1 << 20).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn envelope(id: u64, method: &str, params: Value) -> Value {
    json!({"jsonrpc": "2.0", "id": id, "method": method, "params": params})
}

#[tokio::test]
async fn scenario_list_after_single_plugin_registration() {
    let server = server_with(vec![]).await;
    let (status, body) = post_mcp(&server, envelope(1, "tools/list", json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["jsonrpc"], "2.0");
    let tools = body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "demo:echo");
    assert_eq!(tools[0]["inputSchema"]["type"], "object");
    assert_eq!(tools[0]["inputSchema"]["properties"]["text"]["type"], "string");
    assert_eq!(tools[0]["inputSchema"]["required"], json!(["text"]));
}

#[tokio::test]
async fn scenario_successful_echo() {
    let server = server_with(vec![]).await;
    let (status, body) = post_mcp(
        &server,
        envelope(2, "tools/call", json!({"name": "demo:echo", "arguments": {"text": "hi"}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["result"]["content"], json!([{"type": "text", "text": "hi"}]));
}

#[tokio::test]
async fn scenario_unknown_tool() {
    let server = server_with(vec![]).await;
    let (status, body) = post_mcp(
        &server,
        envelope(3, "tools/call", json!({"name": "demo:nope", "arguments": {}})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32601);
    assert_eq!(body["error"]["message"], "Tool not found: demo:nope");
}

#[tokio::test]
async fn scenario_rate_limit_trips_on_third_call() {
    let server = server_with(vec![Arc::new(RateLimitMiddleware::new(
        2,
        Duration::from_millis(60_000),
    ))])
    .await;

    let call = envelope(4, "tools/call", json!({"name": "demo:echo", "arguments": {"text": "x"}}));

    let (status, body) = post_mcp(&server, call.clone()).await;
    assert_eq!(status, StatusCode::OK, "first call passes: {:?}", body);
    let (status, _) = post_mcp(&server, call.clone()).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = post_mcp(&server, call).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], -32603);
    assert_eq!(body["error"]["message"], "Rate limit exceeded for tool demo:echo");
}

#[tokio::test]
async fn empty_registry_lists_are_empty_not_errors() {
    let server = McpServer::builder(ServerConfig::default()).build().await.unwrap();
    let (_, body) = post_mcp(&server, envelope(5, "tools/list", json!({}))).await;
    assert_eq!(body["result"], json!({"tools": []}));

    let (_, body) = post_mcp(&server, envelope(6, "resources/list", json!({}))).await;
    assert_eq!(body["result"], json!({"resources": []}));

    let (_, body) = post_mcp(&server, envelope(7, "prompts/list", json!({}))).await;
    assert_eq!(body["result"], json!({"prompts": []}));
}

#[tokio::test]
async fn unknown_resource_uri_is_invalid_request() {
    let server = server_with(vec![]).await;
    let (status, body) = post_mcp(
        &server,
        envelope(8, "resources/read", json!({"uri": "memory://missing"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["error"]["code"], -32600);
}

#[tokio::test]
async fn validation_middleware_rejects_array_arguments() {
    let server = server_with(vec![Arc::new(ValidationMiddleware::new())]).await;
    let (status, body) = post_mcp(
        &server,
        envelope(9, "tools/call", json!({"name": "demo:echo", "arguments": [1, 2]})),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["code"], -32603);
    assert!(body["error"]["message"]
        .as_str()
        .unwrap()
        .contains("must be an object"));
}

#[tokio::test]
async fn register_then_shutdown_restores_registries() {
    let server = server_with(vec![]).await;
    assert_eq!(server.host().list_tools().len(), 1);

    server.shutdown().await;
    assert!(server.host().list_tools().is_empty());
    assert_eq!(server.host().plugin_count(), 0);

    let (_, body) = post_mcp(&server, envelope(10, "tools/list", json!({}))).await;
    assert_eq!(body["result"], json!({"tools": []}));
}

#[tokio::test]
async fn tool_registry_keys_match_plugin_prefix() {
    struct SecondPlugin {
        meta: PluginMetadata,
    }

    #[async_trait]
    impl Plugin for SecondPlugin {
        fn metadata(&self) -> &PluginMetadata {
            &self.meta
        }
        async fn initialize(&self, ctx: &RegistrationContext) -> Result<(), HostError> {
            ctx.register_tool(
                ToolBuilder::new("probe", "A second plugin's tool")
                    .handler(|_p, _c| async { Ok(json!("ok")) })
                    .build()?,
            )
        }
    }

    let server = McpServer::builder(ServerConfig::default())
        .plugin(Arc::new(DemoPlugin::new()))
        .plugin(Arc::new(SecondPlugin {
            meta: PluginMetadata::new("aux", "Aux", "0.1.0", ""),
        }))
        .build()
        .await
        .unwrap();

    let names: Vec<String> = server
        .host()
        .list_tools()
        .into_iter()
        .map(|(name, _)| name)
        .collect();
    assert_eq!(names, vec!["aux:probe", "demo:echo"]);
    for name in names {
        let (plugin_id, _) = name.split_once(':').unwrap();
        assert!(server
            .host()
            .list_plugins()
            .iter()
            .any(|p| p.id == plugin_id));
    }
}

#[tokio::test]
async fn conversational_calls_see_the_resolved_workflow() {
    use manifold::orchestrator::store::InMemorySessionStore;
    use manifold::orchestrator::types::WorkflowDefinition;
    use manifold::Orchestrator;

    struct ContextProbe {
        meta: PluginMetadata,
    }

    #[async_trait]
    impl Plugin for ContextProbe {
        fn metadata(&self) -> &PluginMetadata {
            &self.meta
        }
        async fn initialize(&self, ctx: &RegistrationContext) -> Result<(), HostError> {
            ctx.register_tool(
                ToolBuilder::new("whereami", "Report the current workflow")
                    .handler(|_params, ctx| async move {
                        Ok(json!({
                            "workflow": ctx.request_context().current_workflow,
                            "session": ctx.request_context().session_id,
                        }))
                    })
                    .build()?,
            )
        }
    }

    let orchestrator = Arc::new(Orchestrator::new(Arc::new(InMemorySessionStore::new())));
    orchestrator.register_workflow(WorkflowDefinition::new(
        "character-creation",
        "Character creation",
        vec!["create character".into()],
    ));

    let server = McpServer::builder(ServerConfig::default())
        .plugin(Arc::new(ContextProbe {
            meta: PluginMetadata::new("probe", "Probe", "1.0.0", ""),
        }))
        .orchestrator(orchestrator)
        .build()
        .await
        .unwrap();

    // The message rides in params; the orchestrator switches the session
    // before the tool runs, so the tool sees the new workflow.
    let (_, body) = post_mcp(
        &server,
        envelope(
            12,
            "tools/call",
            json!({
                "name": "probe:whereami",
                "arguments": {},
                "message": "please create character",
            }),
        ),
    )
    .await;

    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    let seen: Value = serde_json::from_str(text).unwrap();
    assert_eq!(seen["workflow"], "character-creation");
    assert!(seen["session"].as_str().unwrap().starts_with("session_"));
}

#[tokio::test]
async fn plugin_config_reaches_initialize() {
    struct Configured {
        meta: PluginMetadata,
    }

    #[async_trait]
    impl Plugin for Configured {
        fn metadata(&self) -> &PluginMetadata {
            &self.meta
        }
        async fn initialize(&self, ctx: &RegistrationContext) -> Result<(), HostError> {
            let greeting = ctx
                .config()
                .get("greeting")
                .and_then(Value::as_str)
                .unwrap_or("hello")
                .to_string();
            ctx.register_tool(
                ToolBuilder::new("greet", "Configured greeting")
                    .handler(move |_p, _c| {
                        let greeting = greeting.clone();
                        async move { Ok(json!(greeting)) }
                    })
                    .build()?,
            )
        }
    }

    let mut config = HashMap::new();
    config.insert("greeting".to_string(), json!("ahoy"));
    let server = McpServer::builder(ServerConfig::default())
        .plugin_with_config(
            Arc::new(Configured {
                meta: PluginMetadata::new("cfg", "Cfg", "0.1.0", ""),
            }),
            config,
        )
        .build()
        .await
        .unwrap();

    let (_, body) = post_mcp(
        &server,
        envelope(11, "tools/call", json!({"name": "cfg:greet", "arguments": {}})),
    )
    .await;
    assert_eq!(body["result"]["content"][0]["text"], "ahoy");
}
