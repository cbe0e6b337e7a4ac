//! Orchestrator data model
//!
//! Sessions, workflows, and intent analyses serialize with camelCase keys
//! because they cross process boundaries: the session store may be a
//! remote key-value service and clients inspect intent payloads.
//!
//! Two invariants worth calling out:
//!
//! - `WorkflowState.checkpoints` and `WorkflowContext.checkpoints` are the
//!   same logical list recorded twice; appends go through the context
//!   manager, which keeps both in sync.
//! - `GlobalContext.recent_workflows` is a deduplicated MRU list capped at
//!   [`RECENT_WORKFLOWS_CAP`], most recent first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Cap on the `recent_workflows` MRU list
pub const RECENT_WORKFLOWS_CAP: usize = 10;

/// The `current_context` value when no workflow is active
pub const GENERAL_CONTEXT: &str = "general";

// ============================================================================
// Sessions
// ============================================================================

/// One entry of a session's conversation history (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationEntry {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl ConversationEntry {
    pub fn user(content: impl Into<String>) -> Self {
        Self::new("user", content)
    }

    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }
}

/// Cross-workflow session state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalContext {
    /// Deduplicated MRU list, most recent first, capped at 10
    #[serde(default)]
    pub recent_workflows: Vec<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub preferences: serde_json::Map<String, Value>,
}

impl GlobalContext {
    /// Move `workflow_id` to the front of the MRU list
    pub fn touch_workflow(&mut self, workflow_id: &str) {
        self.recent_workflows.retain(|w| w != workflow_id);
        self.recent_workflows.insert(0, workflow_id.to_string());
        self.recent_workflows.truncate(RECENT_WORKFLOWS_CAP);
    }
}

/// Per-user conversational state
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSession {
    pub session_id: String,
    pub user_id: String,
    pub user_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_workflow: Option<String>,
    /// `"general"` or the active workflow id
    pub current_context: String,
    #[serde(default)]
    pub global_context: GlobalContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workflow_context: Option<WorkflowContext>,
    #[serde(default)]
    pub conversation_history: Vec<ConversationEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl UserSession {
    pub fn new(
        session_id: impl Into<String>,
        user_id: impl Into<String>,
        user_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            session_id: session_id.into(),
            user_id: user_id.into(),
            user_name: user_name.into(),
            active_workflow: None,
            current_context: GENERAL_CONTEXT.to_string(),
            global_context: GlobalContext::default(),
            workflow_context: None,
            conversation_history: Vec::new(),
            created_at: now,
            updated_at: now,
            metadata: None,
        }
    }
}

// ============================================================================
// Workflows
// ============================================================================

/// A registered interaction mode
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowDefinition {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Phrases that activate this workflow (matched case-insensitively)
    pub triggers: Vec<String>,
    /// Tool names this workflow makes available
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default)]
    pub required_context: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub optional_context: Vec<String>,
    /// Phrases that end this workflow, unioned with the detector's defaults
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub exit_signals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl WorkflowDefinition {
    pub fn new(id: impl Into<String>, name: impl Into<String>, triggers: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: String::new(),
            triggers,
            capabilities: Vec::new(),
            required_context: Vec::new(),
            optional_context: Vec::new(),
            exit_signals: Vec::new(),
            category: None,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStateMetadata {
    pub started_at: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    /// Always within `[0, 100]`
    pub completion_percentage: f64,
    pub is_draft: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// Progress snapshot of one workflow instance
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowState {
    pub workflow_id: String,
    pub current_step: String,
    pub data: Value,
    pub metadata: WorkflowStateMetadata,
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

impl WorkflowState {
    /// A fresh state at step `"initial"`
    pub fn initial(workflow_id: impl Into<String>, data: Value) -> Self {
        let now = Utc::now();
        Self {
            workflow_id: workflow_id.into(),
            current_step: "initial".to_string(),
            data,
            metadata: WorkflowStateMetadata {
                started_at: now,
                last_modified: now,
                completion_percentage: 0.0,
                is_draft: true,
                tags: Vec::new(),
            },
            checkpoints: Vec::new(),
        }
    }
}

/// A snapshot of workflow progress at a moment in time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub data: Value,
}

/// An action recorded against a workflow context
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowHistoryEntry {
    pub action: String,
    pub timestamp: DateTime<Utc>,
    pub details: Value,
}

/// The session-bound context of an active workflow
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowContext {
    pub workflow_id: String,
    pub state: WorkflowState,
    pub hydrated_data: Value,
    /// Tool names available while this workflow is active
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default)]
    pub history: Vec<WorkflowHistoryEntry>,
    /// Mirrors `state.checkpoints`; appends are synchronized
    #[serde(default)]
    pub checkpoints: Vec<Checkpoint>,
}

// ============================================================================
// Intent analysis
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    pub name: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    #[serde(rename = "type")]
    pub entity_type: String,
    pub value: String,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_index: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_index: Option<usize>,
}

/// What the intent detector concluded about one message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentAnalysis {
    /// In `[0, 1]`
    pub confidence: f64,
    pub intents: Vec<Intent>,
    #[serde(default)]
    pub entities: Vec<Entity>,
    pub should_switch_workflow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_workflow: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extracted_data: Option<Value>,
}
