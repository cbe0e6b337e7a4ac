//! Manifold - a plugin-hosting MCP server platform
//!
//! A process that accepts JSON-RPC 2.0 requests over stdio, HTTP, or
//! WebSocket, dispatches them to dynamically registered tools, resources,
//! and prompts, wraps every tool call in a middleware pipeline, and can
//! route conversational traffic through a session orchestrator that
//! switches workflows on detected intent.
//!
//! ## Layers
//!
//! - [`transport`] - framing and connection handling per medium
//! - [`kernel`] - the method dispatcher and per-call context
//! - [`host`] - plugin lifecycle and the capability registries
//! - [`middleware`] - pre/post/on-error hooks around tool calls
//! - [`orchestrator`] - sessions, workflows, intent detection

pub mod config;
pub mod host;
pub mod kernel;
pub mod middleware;
pub mod orchestrator;
pub mod protocol;
pub mod transport;

// Re-export the types a typical embedding touches
pub use config::{ServerConfig, TransportConfig};
pub use host::{Plugin, PluginHost, PluginMetadata};
pub use kernel::{McpServer, McpServerBuilder};
pub use middleware::{
    LoggingMiddleware, Middleware, RateLimitMiddleware, ValidationMiddleware,
};
pub use orchestrator::Orchestrator;
