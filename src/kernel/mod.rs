//! Server kernel
//!
//! The kernel owns the dispatch table for the six MCP methods, wraps every
//! `tools/call` in the middleware pipeline, and builds the per-call
//! context. It holds the plugin host (which owns the registries), the
//! middleware chain, and optionally an orchestrator; when the orchestrator
//! is wired in, conversational requests run through it before dispatch so
//! the resolved tool sees the correct current workflow.
//!
//! Method contracts:
//!
//! | method         | success                                   | failure                     |
//! |----------------|-------------------------------------------|-----------------------------|
//! | tools/list     | `{tools: [...]}`                          | -                           |
//! | tools/call     | `{content: [{type:"text", text}]}`        | -32601 unknown, -32603 fail |
//! | resources/list | `{resources: [...]}`                      | -                           |
//! | resources/read | `{contents: [{uri, mimeType, text}]}`     | -32600 unknown, -32603 fail |
//! | prompts/list   | `{prompts: [...]}`                        | -                           |
//! | prompts/get    | `{description, messages}`                 | -32600 unknown, -32603 fail |

pub mod context;

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::ServerConfig;
use crate::host::{HostError, Plugin, PluginHost};
use crate::middleware::{Middleware, MiddlewarePipeline, ToolCallInfo};
use crate::orchestrator::Orchestrator;
use crate::protocol::{codes, JsonRpcResponse, RpcError};
use crate::transport::{RequestHandler, TransportRequest};

use context::{CallContext, UserRequestContext};

/// The MCP server kernel
pub struct McpServer {
    config: ServerConfig,
    host: Arc<PluginHost>,
    pipeline: MiddlewarePipeline,
    orchestrator: Option<Arc<Orchestrator>>,
}

/// Assembles a kernel: plugins registered in order, middleware chained in
/// order, orchestrator optional.
pub struct McpServerBuilder {
    config: ServerConfig,
    plugins: Vec<(Arc<dyn Plugin>, HashMap<String, Value>)>,
    middleware: Vec<Arc<dyn Middleware>>,
    orchestrator: Option<Arc<Orchestrator>>,
}

impl McpServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            plugins: Vec::new(),
            middleware: Vec::new(),
            orchestrator: None,
        }
    }

    pub fn plugin(self, plugin: Arc<dyn Plugin>) -> Self {
        self.plugin_with_config(plugin, HashMap::new())
    }

    pub fn plugin_with_config(
        mut self,
        plugin: Arc<dyn Plugin>,
        config: HashMap<String, Value>,
    ) -> Self {
        self.plugins.push((plugin, config));
        self
    }

    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn orchestrator(mut self, orchestrator: Arc<Orchestrator>) -> Self {
        self.orchestrator = Some(orchestrator);
        self
    }

    /// Register every plugin and produce the kernel
    ///
    /// Registration errors abort the build, preventing server start.
    pub async fn build(self) -> Result<Arc<McpServer>, HostError> {
        let host = Arc::new(PluginHost::new());
        for (plugin, config) in self.plugins {
            host.register(plugin, config).await?;
        }
        Ok(Arc::new(McpServer {
            config: self.config,
            host,
            pipeline: MiddlewarePipeline::new(self.middleware),
            orchestrator: self.orchestrator,
        }))
    }
}

impl McpServer {
    pub fn builder(config: ServerConfig) -> McpServerBuilder {
        McpServerBuilder::new(config)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn host(&self) -> &Arc<PluginHost> {
        &self.host
    }

    pub fn orchestrator(&self) -> Option<&Arc<Orchestrator>> {
        self.orchestrator.as_ref()
    }

    /// Shut down plugins (reverse registration order) and clear registries
    pub async fn shutdown(&self) {
        self.host.shutdown().await;
    }

    /// The dispatcher closure injected into transports
    pub fn request_handler(self: &Arc<Self>) -> RequestHandler {
        let server = Arc::clone(self);
        Arc::new(move |req| {
            let server = Arc::clone(&server);
            Box::pin(async move { server.dispatch(req).await })
        })
    }

    /// Route one normalized request to its method handler
    pub async fn dispatch(&self, req: TransportRequest) -> JsonRpcResponse {
        let id = req.id.clone().unwrap_or(Value::Null);
        tracing::debug!(method = %req.method, "Dispatching request");

        let result = match req.method.as_str() {
            "tools/list" => Ok(self.handle_tools_list()),
            "tools/call" => self.handle_tools_call(&req).await,
            "resources/list" => Ok(self.handle_resources_list()),
            "resources/read" => self.handle_resources_read(&req).await,
            "prompts/list" => Ok(self.handle_prompts_list()),
            "prompts/get" => self.handle_prompts_get(&req).await,
            other => Err(RpcError::method_not_found(other)),
        };

        match result {
            Ok(value) => JsonRpcResponse::success(id, value),
            Err(error) => JsonRpcResponse::error(id, error),
        }
    }

    // === Listings ===

    fn handle_tools_list(&self) -> Value {
        let tools: Vec<Value> = self
            .host
            .list_tools()
            .into_iter()
            .map(|(name, tool)| {
                json!({
                    "name": name,
                    "description": tool.description,
                    "inputSchema": tool.input_schema,
                })
            })
            .collect();
        json!({ "tools": tools })
    }

    fn handle_resources_list(&self) -> Value {
        let resources: Vec<Value> = self
            .host
            .list_resources()
            .into_iter()
            .map(|resource| {
                let mut entry = json!({
                    "uri": resource.uri,
                    "name": resource.name,
                    "description": resource.description,
                });
                if let Some(mime) = resource.mime_type {
                    entry["mimeType"] = json!(mime);
                }
                entry
            })
            .collect();
        json!({ "resources": resources })
    }

    fn handle_prompts_list(&self) -> Value {
        let prompts: Vec<Value> = self
            .host
            .list_prompts()
            .into_iter()
            .map(|(name, prompt)| {
                json!({
                    "name": name,
                    "description": prompt.description,
                    "arguments": prompt.arguments,
                })
            })
            .collect();
        json!({ "prompts": prompts })
    }

    // === tools/call ===

    async fn handle_tools_call(&self, req: &TransportRequest) -> Result<Value, RpcError> {
        let params = req.params.clone().unwrap_or(Value::Null);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires a 'name'"))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let request = self.build_request_context(req).await;

        let tool = self.host.get_tool(&name).ok_or_else(|| {
            RpcError::new(codes::METHOD_NOT_FOUND, format!("Tool not found: {}", name))
        })?;

        let call = ToolCallInfo::new(&name, arguments.clone())
            .with_caller(request.session_id.clone(), request.user_id.clone());

        self.pipeline
            .before(&call)
            .await
            .map_err(|e| RpcError::internal(e.to_string()).with_data(json!({"tool": name})))?;

        let plugin_id = name.split(':').next().unwrap_or(&name);
        let ctx = CallContext::new(Arc::clone(&self.host), request, plugin_id);

        let output = match (tool.handler)(arguments, ctx).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(tool = %name, error = %e, "Tool handler failed");
                self.pipeline
                    .error(&e.to_string(), &name, Some(&call.params))
                    .await;
                return Err(RpcError::internal(e.to_string()).with_data(json!({"tool": name})));
            }
        };

        self.pipeline
            .after(&call, &output)
            .await
            .map_err(|e| RpcError::internal(e.to_string()).with_data(json!({"tool": name})))?;

        Ok(json!({
            "content": [{ "type": "text", "text": render_text(&output) }]
        }))
    }

    // === resources/read ===

    async fn handle_resources_read(&self, req: &TransportRequest) -> Result<Value, RpcError> {
        let params = req.params.clone().unwrap_or(Value::Null);
        let uri = params
            .get("uri")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("resources/read requires a 'uri'"))?
            .to_string();

        let resource = self.host.get_resource(&uri).ok_or_else(|| {
            RpcError::invalid_request(format!("Resource not found: {}", uri))
        })?;

        let request = self.build_request_context(req).await;
        let call = ToolCallInfo::new(&uri, json!({}))
            .with_caller(request.session_id.clone(), request.user_id.clone());

        if self.config.pipeline_covers_reads {
            self.pipeline
                .before(&call)
                .await
                .map_err(|e| RpcError::internal(e.to_string()))?;
        }

        let plugin_id = resource.name.clone();
        let ctx = CallContext::new(Arc::clone(&self.host), request, &plugin_id);

        let payload = match (resource.handler)(ctx).await {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!(uri = %uri, error = %e, "Resource handler failed");
                self.pipeline.error(&e.to_string(), &uri, None).await;
                return Err(RpcError::internal(e.to_string()));
            }
        };

        if self.config.pipeline_covers_reads {
            self.pipeline
                .after(&call, &payload)
                .await
                .map_err(|e| RpcError::internal(e.to_string()))?;
        }

        let mime = resource
            .mime_type
            .unwrap_or_else(|| "text/plain".to_string());
        Ok(json!({
            "contents": [{ "uri": uri, "mimeType": mime, "text": render_text(&payload) }]
        }))
    }

    // === prompts/get ===

    async fn handle_prompts_get(&self, req: &TransportRequest) -> Result<Value, RpcError> {
        let params = req.params.clone().unwrap_or(Value::Null);
        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("prompts/get requires a 'name'"))?
            .to_string();
        let arguments = params.get("arguments").cloned().unwrap_or(json!({}));

        let prompt = self.host.get_prompt(&name).ok_or_else(|| {
            RpcError::invalid_request(format!("Prompt not found: {}", name))
        })?;

        let request = self.build_request_context(req).await;
        let call = ToolCallInfo::new(&name, arguments.clone())
            .with_caller(request.session_id.clone(), request.user_id.clone());

        if self.config.pipeline_covers_reads {
            self.pipeline
                .before(&call)
                .await
                .map_err(|e| RpcError::internal(e.to_string()))?;
        }

        let plugin_id = name.split(':').next().unwrap_or(&name).to_string();
        let ctx = CallContext::new(Arc::clone(&self.host), request, &plugin_id);

        let rendering = match (prompt.handler)(arguments, ctx).await {
            Ok(rendering) => rendering,
            Err(e) => {
                tracing::error!(prompt = %name, error = %e, "Prompt handler failed");
                self.pipeline.error(&e.to_string(), &name, None).await;
                return Err(RpcError::internal(e.to_string()));
            }
        };

        if self.config.pipeline_covers_reads {
            let rendered = serde_json::to_value(&rendering.messages)
                .unwrap_or(Value::Null);
            self.pipeline
                .after(&call, &rendered)
                .await
                .map_err(|e| RpcError::internal(e.to_string()))?;
        }

        Ok(json!({
            "description": prompt.description,
            "messages": rendering.messages,
        }))
    }

    /// Build the request context, routing conversational traffic through
    /// the orchestrator first so the tool sees the resolved workflow.
    async fn build_request_context(&self, req: &TransportRequest) -> UserRequestContext {
        let mut context = UserRequestContext::new();
        context.session_id = req.session_id.clone();
        context.user_id = req.user_id.clone();
        context.current_workflow = req.workflow_id.clone();
        context.message = req.message.clone();
        context.metadata = Some(req.metadata.to_value());

        if let (Some(orchestrator), Some(message)) = (&self.orchestrator, &req.message) {
            match orchestrator
                .process_message(
                    message,
                    req.session_id.clone(),
                    req.user_id.clone(),
                    None,
                )
                .await
            {
                Ok(outcome) => {
                    context.session_id = Some(outcome.session.session_id.clone());
                    context.current_workflow = outcome.session.active_workflow.clone();
                }
                Err(e) => {
                    // Orchestration failures degrade to the transport-provided
                    // workflow; the tool call itself still proceeds.
                    tracing::warn!(error = %e, "Orchestrator rejected message");
                }
            }
        }

        context
    }
}

/// Strings pass through untouched; everything else is JSON-rendered
fn render_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::tool_builder::ToolBuilder;
    use crate::host::{
        PluginMetadata, Prompt, PromptArgument, PromptMessage, PromptRendering,
        RegistrationContext, Resource,
    };
    use crate::middleware::RateLimitMiddleware;
    use crate::transport::RequestMetadata;
    use async_trait::async_trait;
    use std::time::Duration;

    struct DemoPlugin {
        meta: PluginMetadata,
    }

    impl DemoPlugin {
        fn new() -> Self {
            Self {
                meta: PluginMetadata::new("demo", "Demo", "1.0.0", "kernel test fixture"),
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
                    .string_param("text", "The text to echo", true)
                    .handler(|params, _ctx| async move {
                        Ok(params.get("text").cloned().unwrap_or(Value::Null))
                    })
                    .build()?,
            )?;

            ctx.register_resource(Resource {
                uri: "memory://demo/readme".to_string(),
                name: "readme".to_string(),
                description: "Demo readme".to_string(),
                mime_type: Some("text/markdown".to_string()),
                handler: Arc::new(|_ctx| Box::pin(async { Ok(json!("# Demo")) })),
            })?;

            ctx.register_prompt(Prompt {
                name: "greet".to_string(),
                description: "Greets someone".to_string(),
                arguments: vec![PromptArgument {
                    name: "who".to_string(),
                    description: "Person to greet".to_string(),
                    required: true,
                }],
                handler: Arc::new(|args, _ctx| {
                    Box::pin(async move {
                        let who = args
                            .get("who")
                            .and_then(Value::as_str)
                            .unwrap_or("world")
                            .to_string();
                        Ok(PromptRendering {
                            messages: vec![PromptMessage::text("user", format!("Hello, {}!", who))],
                        })
                    })
                }),
            })?;
            Ok(())
        }
    }

    async fn demo_server() -> Arc<McpServer> {
        McpServer::builder(ServerConfig::default())
            .plugin(Arc::new(DemoPlugin::new()))
            .build()
            .await
            .unwrap()
    }

    fn request(method: &str, params: Option<Value>) -> TransportRequest {
        TransportRequest {
            method: method.to_string(),
            params,
            id: Some(json!(1)),
            session_id: None,
            user_id: None,
            workflow_id: None,
            message: None,
            metadata: RequestMetadata::for_transport("test"),
        }
    }

    #[tokio::test]
    async fn tools_list_returns_namespaced_union() {
        let server = demo_server().await;
        let resp = server.dispatch(request("tools/list", None)).await;
        let result = resp.result.unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "demo:echo");
        assert_eq!(tools[0]["inputSchema"]["type"], "object");
        assert_eq!(tools[0]["inputSchema"]["required"][0], "text");
    }

    #[tokio::test]
    async fn tools_list_is_empty_not_error_without_plugins() {
        let server = McpServer::builder(ServerConfig::default())
            .build()
            .await
            .unwrap();
        let resp = server.dispatch(request("tools/list", None)).await;
        assert_eq!(resp.result.unwrap(), json!({"tools": []}));
    }

    #[tokio::test]
    async fn echo_call_passes_strings_through() {
        let server = demo_server().await;
        let resp = server
            .dispatch(request(
                "tools/call",
                Some(json!({"name": "demo:echo", "arguments": {"text": "hi"}})),
            ))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(result["content"][0]["type"], "text");
        assert_eq!(result["content"][0]["text"], "hi");
    }

    #[tokio::test]
    async fn unknown_tool_is_method_not_found() {
        let server = demo_server().await;
        let resp = server
            .dispatch(request(
                "tools/call",
                Some(json!({"name": "demo:nope", "arguments": {}})),
            ))
            .await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, codes::METHOD_NOT_FOUND);
        assert_eq!(err.message, "Tool not found: demo:nope");
    }

    #[tokio::test]
    async fn unknown_method_is_method_not_found() {
        let server = demo_server().await;
        let resp = server.dispatch(request("tools/destroy", None)).await;
        assert_eq!(resp.error.unwrap().code, codes::METHOD_NOT_FOUND);
    }

    #[tokio::test]
    async fn resources_read_known_and_unknown() {
        let server = demo_server().await;
        let resp = server
            .dispatch(request(
                "resources/read",
                Some(json!({"uri": "memory://demo/readme"})),
            ))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(result["contents"][0]["uri"], "memory://demo/readme");
        assert_eq!(result["contents"][0]["mimeType"], "text/markdown");
        assert_eq!(result["contents"][0]["text"], "# Demo");

        let resp = server
            .dispatch(request(
                "resources/read",
                Some(json!({"uri": "memory://missing"})),
            ))
            .await;
        assert_eq!(resp.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn prompts_get_renders_messages() {
        let server = demo_server().await;
        let resp = server
            .dispatch(request(
                "prompts/get",
                Some(json!({"name": "demo:greet", "arguments": {"who": "Ada"}})),
            ))
            .await;
        let result = resp.result.unwrap();
        assert_eq!(result["description"], "Greets someone");
        assert_eq!(result["messages"][0]["content"]["text"], "Hello, Ada!");

        let resp = server
            .dispatch(request("prompts/get", Some(json!({"name": "demo:none"}))))
            .await;
        assert_eq!(resp.error.unwrap().code, codes::INVALID_REQUEST);
    }

    #[tokio::test]
    async fn rate_limit_surfaces_as_internal_error() {
        let server = McpServer::builder(ServerConfig::default())
            .plugin(Arc::new(DemoPlugin::new()))
            .middleware(Arc::new(RateLimitMiddleware::new(
                2,
                Duration::from_millis(60_000),
            )))
            .build()
            .await
            .unwrap();

        let call = || {
            request(
                "tools/call",
                Some(json!({"name": "demo:echo", "arguments": {"text": "hi"}})),
            )
        };
        assert!(server.dispatch(call()).await.is_success());
        assert!(server.dispatch(call()).await.is_success());

        let resp = server.dispatch(call()).await;
        let err = resp.error.unwrap();
        assert_eq!(err.code, codes::INTERNAL_ERROR);
        assert_eq!(err.message, "Rate limit exceeded for tool demo:echo");
    }

    #[tokio::test]
    async fn non_string_results_are_json_rendered() {
        struct JsonPlugin {
            meta: PluginMetadata,
        }

        #[async_trait]
        impl Plugin for JsonPlugin {
            fn metadata(&self) -> &PluginMetadata {
                &self.meta
            }
            async fn initialize(&self, ctx: &RegistrationContext) -> Result<(), HostError> {
                ctx.register_tool(
                    ToolBuilder::new("stats", "Return structured data")
                        .handler(|_params, _ctx| async { Ok(json!({"count": 3})) })
                        .build()?,
                )
            }
        }

        let server = McpServer::builder(ServerConfig::default())
            .plugin(Arc::new(JsonPlugin {
                meta: PluginMetadata::new("data", "Data", "1.0.0", ""),
            }))
            .build()
            .await
            .unwrap();

        let resp = server
            .dispatch(request(
                "tools/call",
                Some(json!({"name": "data:stats", "arguments": {}})),
            ))
            .await;
        assert_eq!(
            resp.result.unwrap()["content"][0]["text"],
            "{\"count\":3}"
        );
    }
}
