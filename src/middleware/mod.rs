//! Middleware pipeline around tool invocations
//!
//! A middleware chain runs pre-call / post-call / on-error hooks in
//! registration order. Callers:
//!
//! 1. Kernel resolves a tool -> `pipeline.before(...)` -> abort or continue
//! 2. Tool finishes -> `pipeline.after(...)`
//! 3. Anything fails -> `pipeline.error(...)` fires every `on_error` hook,
//!    observable but non-recovering, then the failure propagates
//!
//! Hooks have no-op default implementations, so a middleware only pays for
//! the hooks it implements.

pub mod builtin;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use builtin::{LoggingMiddleware, RateLimitKey, RateLimitMiddleware, ValidationMiddleware};

#[derive(Debug, Error)]
pub enum MiddlewareError {
    #[error("Rate limit exceeded for tool {0}")]
    RateLimited(String),
    #[error("Invalid arguments for tool {tool}: {reason}")]
    InvalidArguments { tool: String, reason: String },
    #[error("{0}")]
    Aborted(String),
}

/// Everything a hook can know about one tool call
///
/// Carries caller identity alongside the tool name and params so keyed
/// middlewares (per-session / per-user rate limits) work without a wider
/// hook signature.
#[derive(Debug, Clone)]
pub struct ToolCallInfo {
    pub tool_name: String,
    pub params: Value,
    pub session_id: Option<String>,
    pub user_id: Option<String>,
}

impl ToolCallInfo {
    pub fn new(tool_name: impl Into<String>, params: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            params,
            session_id: None,
            user_id: None,
        }
    }

    pub fn with_caller(mut self, session_id: Option<String>, user_id: Option<String>) -> Self {
        self.session_id = session_id;
        self.user_id = user_id;
        self
    }
}

/// A pre/post/on-error hook chained around every `tools/call`
#[async_trait]
pub trait Middleware: Send + Sync {
    fn name(&self) -> &str;

    /// Runs before the tool; failing aborts the call
    async fn before_tool_call(&self, _call: &ToolCallInfo) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Runs after a successful tool invocation
    async fn after_tool_call(
        &self,
        _call: &ToolCallInfo,
        _result: &Value,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    /// Observes any failure in the call path; must not fail itself
    async fn on_error(&self, _error: &str, _context: &str, _detail: Option<&Value>) {}
}

/// Ordered middleware chain
#[derive(Default)]
pub struct MiddlewarePipeline {
    chain: Vec<std::sync::Arc<dyn Middleware>>,
}

impl MiddlewarePipeline {
    pub fn new(chain: Vec<std::sync::Arc<dyn Middleware>>) -> Self {
        Self { chain }
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    /// Run every `before_tool_call` in registration order
    ///
    /// On failure the remaining `before` hooks are skipped, every
    /// `on_error` hook fires, and the error is returned.
    pub async fn before(&self, call: &ToolCallInfo) -> Result<(), MiddlewareError> {
        for middleware in &self.chain {
            if let Err(e) = middleware.before_tool_call(call).await {
                tracing::debug!(
                    middleware = middleware.name(),
                    tool = %call.tool_name,
                    error = %e,
                    "before_tool_call aborted the pipeline"
                );
                self.error(&e.to_string(), &call.tool_name, Some(&call.params))
                    .await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Run every `after_tool_call` in registration order
    pub async fn after(&self, call: &ToolCallInfo, result: &Value) -> Result<(), MiddlewareError> {
        for middleware in &self.chain {
            if let Err(e) = middleware.after_tool_call(call, result).await {
                self.error(&e.to_string(), &call.tool_name, None).await;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Fire every `on_error` hook in registration order
    pub async fn error(&self, error: &str, context: &str, detail: Option<&Value>) {
        for middleware in &self.chain {
            middleware.on_error(error, context, detail).await;
        }
    }
}
