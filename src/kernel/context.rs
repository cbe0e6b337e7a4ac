//! Per-request call context
//!
//! The kernel builds one [`CallContext`] per dispatch and hands it to the
//! handler. The context owns its request data, so concurrent requests can
//! never observe each other's state; there is no process-wide "current
//! request" slot. Handlers must not retain the context beyond their scope.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::host::logger::PluginLogger;
use crate::host::{HostError, PluginHost, Prompt, Resource, Tool};

/// Scope: one request. Built by the kernel on entry, dropped on exit.
#[derive(Debug, Clone)]
pub struct UserRequestContext {
    pub session_id: Option<String>,
    pub user_id: Option<String>,
    pub current_workflow: Option<String>,
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<Value>,
}

impl UserRequestContext {
    pub fn new() -> Self {
        Self {
            session_id: None,
            user_id: None,
            current_workflow: None,
            message: None,
            timestamp: Utc::now(),
            metadata: None,
        }
    }
}

impl Default for UserRequestContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Capability handed to every tool/resource/prompt handler
///
/// Grants the plugin's namespaced logger, the request context, and the
/// workflow-state accessors. The `register_*` methods exist so plugin code
/// written against the registration context fails loudly if it leaks a
/// call context into the registration path: they always reject.
#[derive(Clone)]
pub struct CallContext {
    host: Arc<PluginHost>,
    request: Arc<UserRequestContext>,
    logger: PluginLogger,
}

impl CallContext {
    pub(crate) fn new(
        host: Arc<PluginHost>,
        request: UserRequestContext,
        plugin_id: &str,
    ) -> Self {
        Self {
            host,
            request: Arc::new(request),
            logger: PluginLogger::new(plugin_id),
        }
    }

    /// The context of the request being served; treat as immutable
    pub fn request_context(&self) -> &UserRequestContext {
        &self.request
    }

    pub fn logger(&self) -> &PluginLogger {
        &self.logger
    }

    /// State cached under the request's current workflow, if any
    pub fn workflow_state(&self) -> Option<Value> {
        let workflow = self.request.current_workflow.as_deref()?;
        self.host.workflow_state(workflow)
    }

    /// Replace the state under the current workflow; no-op without one
    ///
    /// This is the only supported write path for in-request state mutation.
    pub fn update_workflow_state(&self, state: Value) {
        if let Some(workflow) = self.request.current_workflow.as_deref() {
            self.host.set_workflow_state(workflow, state);
        }
    }

    /// Fail-active stub: registration is only possible during `initialize`
    pub fn register_tool(&self, _tool: Tool) -> Result<(), HostError> {
        Err(HostError::RegistrationClosed(
            self.logger.plugin_id().to_string(),
        ))
    }

    /// Fail-active stub: registration is only possible during `initialize`
    pub fn register_resource(&self, _resource: Resource) -> Result<(), HostError> {
        Err(HostError::RegistrationClosed(
            self.logger.plugin_id().to_string(),
        ))
    }

    /// Fail-active stub: registration is only possible during `initialize`
    pub fn register_prompt(&self, _prompt: Prompt) -> Result<(), HostError> {
        Err(HostError::RegistrationClosed(
            self.logger.plugin_id().to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ToolSchema;
    use serde_json::json;

    fn context_for(workflow: Option<&str>) -> (Arc<PluginHost>, CallContext) {
        let host = Arc::new(PluginHost::new());
        let mut request = UserRequestContext::new();
        request.current_workflow = workflow.map(String::from);
        let ctx = CallContext::new(Arc::clone(&host), request, "demo");
        (host, ctx)
    }

    #[test]
    fn workflow_state_reads_through_host() {
        let (host, ctx) = context_for(Some("character-creation"));
        assert!(ctx.workflow_state().is_none());

        host.set_workflow_state("character-creation", json!({"step": "naming"}));
        assert_eq!(ctx.workflow_state(), Some(json!({"step": "naming"})));
    }

    #[test]
    fn update_without_workflow_is_a_no_op() {
        let (host, ctx) = context_for(None);
        ctx.update_workflow_state(json!({"step": "lost"}));
        assert!(host.workflow_state("character-creation").is_none());
    }

    #[test]
    fn update_replaces_state_under_current_workflow() {
        let (host, ctx) = context_for(Some("story"));
        ctx.update_workflow_state(json!({"chapter": 1}));
        ctx.update_workflow_state(json!({"chapter": 2}));
        assert_eq!(host.workflow_state("story"), Some(json!({"chapter": 2})));
    }

    #[test]
    fn registration_stubs_reject() {
        let (_host, ctx) = context_for(None);
        let err = ctx
            .register_tool(crate::host::Tool {
                name: "late".into(),
                description: String::new(),
                input_schema: ToolSchema::empty(),
                handler: Arc::new(|_, _| Box::pin(async { Ok(Value::Null) })),
            })
            .unwrap_err();
        assert!(matches!(err, HostError::RegistrationClosed(_)));
    }
}
