//! Session orchestrator
//!
//! Independent of the server kernel: it can sit in the kernel's request
//! pipeline or in a separate host. The facade resolves sessions, runs
//! intent detection over incoming messages, switches workflow contexts,
//! and persists everything through the pluggable session store.
//!
//! ## Modules
//!
//! - [`types`] - sessions, workflows, checkpoints, intent analyses
//! - [`store`] - the `SessionStore` trait plus in-memory and key-value stores
//! - [`session`] - session lifecycle on top of a store
//! - [`registry`] - workflow definitions, looked up by id/trigger/category
//! - [`context`] - context switching, progress, checkpoints
//! - [`intent`] - the pluggable intent detector and its rule-based default

pub mod context;
pub mod intent;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use context::{ContextLoader, ContextManager};
use intent::{IntentDetector, RuleBasedIntentDetector};
use registry::WorkflowRegistry;
use session::SessionManager;
use store::{SessionStore, StoreError};
use types::{
    Checkpoint, ConversationEntry, IntentAnalysis, UserSession, WorkflowDefinition,
};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Unknown workflow: {0}")]
    UnknownWorkflow(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("No active workflow for session: {0}")]
    NoActiveWorkflow(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What `process_message` produced
#[derive(Debug, Clone)]
pub struct ProcessOutcome {
    pub session: UserSession,
    pub intent: IntentAnalysis,
    pub workflow_changed: bool,
}

/// Summary of one session's activity
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStats {
    pub session_id: String,
    pub user_id: String,
    pub message_count: usize,
    pub active_workflow: Option<String>,
    pub current_context: String,
    pub recent_workflows: Vec<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
    pub age_seconds: i64,
}

/// Per-component liveness report
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthReport {
    pub status: String,
    pub components: HealthComponents,
    pub active_sessions: Option<usize>,
    pub registered_workflows: usize,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthComponents {
    pub session_store: bool,
    pub workflow_registry: bool,
    pub intent_detector: bool,
}

/// The orchestrator facade
pub struct Orchestrator {
    sessions: SessionManager,
    registry: Arc<WorkflowRegistry>,
    context: ContextManager,
    detector: Arc<dyn IntentDetector>,
    started_at: Instant,
}

impl Orchestrator {
    /// Build with the rule-based detector over a fresh registry
    pub fn new(store: Arc<dyn SessionStore>) -> Self {
        let registry = Arc::new(WorkflowRegistry::new());
        Self {
            sessions: SessionManager::new(store),
            detector: Arc::new(RuleBasedIntentDetector::new(Arc::clone(&registry))),
            context: ContextManager::new(Arc::clone(&registry)),
            registry,
            started_at: Instant::now(),
        }
    }

    /// Swap in a custom intent detector
    pub fn with_detector(mut self, detector: Arc<dyn IntentDetector>) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.sessions = self.sessions.with_timeout(timeout);
        self
    }

    pub fn registry(&self) -> &Arc<WorkflowRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn register_workflow(&self, definition: WorkflowDefinition) {
        self.registry.register(definition);
    }

    pub fn register_context_loader(
        &self,
        workflow_id: impl Into<String>,
        loader: Arc<dyn ContextLoader>,
    ) {
        self.context.register_loader(workflow_id, loader);
    }

    /// Run one user message through the orchestration pipeline
    ///
    /// Resolves (or creates) the session, appends the message to history,
    /// detects intent, switches workflow context when the detector says
    /// so, and persists the session.
    pub async fn process_message(
        &self,
        message: &str,
        session_id: Option<String>,
        user_id: Option<String>,
        user_name: Option<String>,
    ) -> Result<ProcessOutcome, OrchestratorError> {
        let user_id = user_id.unwrap_or_else(|| "anonymous".to_string());
        let user_name = user_name.unwrap_or_else(|| user_id.clone());

        let mut session = self
            .sessions
            .get_or_create_session(session_id, &user_id, &user_name)
            .await?;

        session
            .conversation_history
            .push(ConversationEntry::user(message));

        let intent = self.detector.analyze_message(message, &session).await;

        let mut workflow_changed = false;
        if intent.should_switch_workflow {
            match intent.target_workflow.as_deref() {
                Some(target) => {
                    self.context
                        .switch_context(&mut session, Some(target), intent.extracted_data.clone())
                        .await?;
                    workflow_changed = true;
                }
                // An exit intent has no target: fall back to general.
                None if session.active_workflow.is_some() => {
                    self.context.switch_context(&mut session, None, None).await?;
                    workflow_changed = true;
                }
                None => {}
            }
        }

        self.sessions.update_session(&mut session).await?;
        tracing::debug!(
            session = %session.session_id,
            confidence = intent.confidence,
            workflow_changed,
            "Message processed"
        );

        Ok(ProcessOutcome {
            session,
            intent,
            workflow_changed,
        })
    }

    /// Explicitly switch a live session's workflow
    pub async fn switch_workflow(
        &self,
        session_id: &str,
        target: Option<&str>,
        init_data: Option<Value>,
    ) -> Result<UserSession, OrchestratorError> {
        let mut session = self.require_session(session_id).await?;
        self.context
            .switch_context(&mut session, target, init_data)
            .await?;
        self.sessions.update_session(&mut session).await?;
        Ok(session)
    }

    pub async fn update_workflow_progress(
        &self,
        session_id: &str,
        step: &str,
        percentage: f64,
    ) -> Result<UserSession, OrchestratorError> {
        let mut session = self.require_session(session_id).await?;
        self.context
            .update_workflow_progress(&mut session, step, percentage)?;
        self.sessions.update_session(&mut session).await?;
        Ok(session)
    }

    pub async fn add_workflow_checkpoint(
        &self,
        session_id: &str,
        description: Option<String>,
        data: Option<Value>,
    ) -> Result<Checkpoint, OrchestratorError> {
        let mut session = self.require_session(session_id).await?;
        let checkpoint = self
            .context
            .add_workflow_checkpoint(&mut session, description, data)?;
        self.sessions.update_session(&mut session).await?;
        Ok(checkpoint)
    }

    pub async fn session_stats(
        &self,
        session_id: &str,
    ) -> Result<SessionStats, OrchestratorError> {
        let session = self.require_session(session_id).await?;
        Ok(SessionStats {
            session_id: session.session_id.clone(),
            user_id: session.user_id.clone(),
            message_count: session.conversation_history.len(),
            active_workflow: session.active_workflow.clone(),
            current_context: session.current_context.clone(),
            recent_workflows: session.global_context.recent_workflows.clone(),
            created_at: session.created_at,
            updated_at: session.updated_at,
            age_seconds: (chrono::Utc::now() - session.created_at).num_seconds(),
        })
    }

    pub async fn cleanup_expired_sessions(&self) -> Result<usize, OrchestratorError> {
        self.sessions.cleanup().await
    }

    /// Per-component liveness plus the headline counters
    pub async fn health_check(&self) -> HealthReport {
        let store_alive = self.sessions.store().exists("__health_probe__").await.is_ok();
        let active_sessions = self
            .sessions
            .store()
            .count()
            .await
            .ok()
            .flatten();

        HealthReport {
            status: if store_alive { "healthy" } else { "degraded" }.to_string(),
            components: HealthComponents {
                session_store: store_alive,
                workflow_registry: true,
                intent_detector: true,
            },
            active_sessions,
            registered_workflows: self.registry.len(),
            uptime_seconds: self.started_at.elapsed().as_secs(),
        }
    }

    async fn require_session(&self, session_id: &str) -> Result<UserSession, OrchestratorError> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or_else(|| OrchestratorError::SessionNotFound(session_id.to_string()))
    }
}
