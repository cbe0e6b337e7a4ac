//! Workflow context management
//!
//! Builds and switches [`WorkflowContext`] on sessions, tracks progress,
//! and records checkpoints. A [`ContextLoader`] registered for a workflow
//! takes over context construction (e.g. to hydrate from external data);
//! otherwise a skeletal context at step `"initial"` is built from the
//! workflow definition.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};

use super::registry::WorkflowRegistry;
use super::types::{
    Checkpoint, UserSession, WorkflowContext, WorkflowHistoryEntry, WorkflowState,
    GENERAL_CONTEXT,
};
use super::OrchestratorError;

/// Loads and hydrates workflow contexts from outside the orchestrator
#[async_trait]
pub trait ContextLoader: Send + Sync {
    async fn load_context(
        &self,
        workflow_id: &str,
        session_id: &str,
        entities: Option<&Value>,
    ) -> Result<WorkflowContext, OrchestratorError>;

    async fn hydrate_context(
        &self,
        context: WorkflowContext,
        entities: &Value,
    ) -> Result<WorkflowContext, OrchestratorError>;
}

pub struct ContextManager {
    registry: Arc<WorkflowRegistry>,
    loaders: RwLock<HashMap<String, Arc<dyn ContextLoader>>>,
}

impl ContextManager {
    pub fn new(registry: Arc<WorkflowRegistry>) -> Self {
        Self {
            registry,
            loaders: RwLock::new(HashMap::new()),
        }
    }

    /// Register a loader for one workflow id
    pub fn register_loader(&self, workflow_id: impl Into<String>, loader: Arc<dyn ContextLoader>) {
        self.loaders
            .write()
            .unwrap()
            .insert(workflow_id.into(), loader);
    }

    /// Switch the session onto `target` (or back to general with `None`)
    ///
    /// Switching to the already-active workflow is idempotent: the
    /// existing context, its checkpoints, and the MRU list are untouched.
    pub async fn switch_context(
        &self,
        session: &mut UserSession,
        target: Option<&str>,
        init_data: Option<Value>,
    ) -> Result<(), OrchestratorError> {
        let Some(target) = target else {
            session.active_workflow = None;
            session.workflow_context = None;
            session.current_context = GENERAL_CONTEXT.to_string();
            tracing::debug!(session = %session.session_id, "Switched to general context");
            return Ok(());
        };

        if session.active_workflow.as_deref() == Some(target) {
            return Ok(());
        }

        let workflow = self
            .registry
            .get(target)
            .ok_or_else(|| OrchestratorError::UnknownWorkflow(target.to_string()))?;

        let loader = self.loaders.read().unwrap().get(target).cloned();
        let context = match loader {
            Some(loader) => {
                loader
                    .load_context(target, &session.session_id, init_data.as_ref())
                    .await?
            }
            None => WorkflowContext {
                workflow_id: target.to_string(),
                state: WorkflowState::initial(target, init_data.unwrap_or_else(|| json!({}))),
                hydrated_data: json!({}),
                tools: workflow.capabilities.clone(),
                history: Vec::new(),
                checkpoints: Vec::new(),
            },
        };

        session.active_workflow = Some(target.to_string());
        session.current_context = target.to_string();
        session.workflow_context = Some(context);
        session.global_context.touch_workflow(target);
        tracing::info!(session = %session.session_id, workflow = %target, "Workflow context switched");
        Ok(())
    }

    /// Stamp the current step and completion percentage
    ///
    /// The percentage is clamped into `[0, 100]`.
    pub fn update_workflow_progress(
        &self,
        session: &mut UserSession,
        step: &str,
        percentage: f64,
    ) -> Result<(), OrchestratorError> {
        let context = session
            .workflow_context
            .as_mut()
            .ok_or_else(|| OrchestratorError::NoActiveWorkflow(session.session_id.clone()))?;

        let percentage = percentage.clamp(0.0, 100.0);
        context.state.current_step = step.to_string();
        context.state.metadata.completion_percentage = percentage;
        context.state.metadata.last_modified = Utc::now();
        context.history.push(WorkflowHistoryEntry {
            action: "progress_update".to_string(),
            timestamp: Utc::now(),
            details: json!({ "step": step, "percentage": percentage }),
        });
        Ok(())
    }

    /// Record a checkpoint at the current step
    ///
    /// Appends to both checkpoint lists (state and context) so they stay
    /// synchronized, and records a `checkpoint_added` history entry.
    pub fn add_workflow_checkpoint(
        &self,
        session: &mut UserSession,
        description: Option<String>,
        data: Option<Value>,
    ) -> Result<Checkpoint, OrchestratorError> {
        let context = session
            .workflow_context
            .as_mut()
            .ok_or_else(|| OrchestratorError::NoActiveWorkflow(session.session_id.clone()))?;

        let now = Utc::now();
        let checkpoint = Checkpoint {
            id: format!("checkpoint_{}", now.timestamp_millis()),
            timestamp: now,
            step: context.state.current_step.clone(),
            description: description.clone(),
            data: data.unwrap_or_else(|| json!({})),
        };

        context.state.checkpoints.push(checkpoint.clone());
        context.checkpoints.push(checkpoint.clone());
        context.history.push(WorkflowHistoryEntry {
            action: "checkpoint_added".to_string(),
            timestamp: now,
            details: json!({
                "checkpointId": checkpoint.id,
                "description": description,
            }),
        });
        Ok(checkpoint)
    }
}
