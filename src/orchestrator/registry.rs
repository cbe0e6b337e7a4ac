//! Workflow registry
//!
//! Keyed by workflow id; registering an existing id replaces it. Trigger
//! lookup returns matches in registration order, which is what gives the
//! intent detector its deterministic first-match semantics.

use std::sync::RwLock;

use super::types::WorkflowDefinition;

#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<Vec<WorkflowDefinition>>,
}

impl WorkflowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a workflow definition
    pub fn register(&self, definition: WorkflowDefinition) {
        let mut workflows = self.workflows.write().unwrap();
        if let Some(existing) = workflows.iter_mut().find(|w| w.id == definition.id) {
            *existing = definition;
        } else {
            tracing::debug!(workflow = %definition.id, "Workflow registered");
            workflows.push(definition);
        }
    }

    pub fn get(&self, workflow_id: &str) -> Option<WorkflowDefinition> {
        self.workflows
            .read()
            .unwrap()
            .iter()
            .find(|w| w.id == workflow_id)
            .cloned()
    }

    pub fn has(&self, workflow_id: &str) -> bool {
        self.workflows
            .read()
            .unwrap()
            .iter()
            .any(|w| w.id == workflow_id)
    }

    /// Workflows whose triggers occur (case-insensitively, as substrings)
    /// in the message, in registration order
    pub fn find_by_trigger(&self, message: &str) -> Vec<WorkflowDefinition> {
        let needle = message.to_lowercase();
        self.workflows
            .read()
            .unwrap()
            .iter()
            .filter(|w| {
                w.triggers
                    .iter()
                    .any(|t| needle.contains(&t.to_lowercase()))
            })
            .cloned()
            .collect()
    }

    pub fn find_by_category(&self, category: &str) -> Vec<WorkflowDefinition> {
        self.workflows
            .read()
            .unwrap()
            .iter()
            .filter(|w| w.category.as_deref() == Some(category))
            .cloned()
            .collect()
    }

    pub fn list(&self) -> Vec<WorkflowDefinition> {
        self.workflows.read().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.workflows.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.workflows.read().unwrap().is_empty()
    }

    pub fn clear(&self) {
        self.workflows.write().unwrap().clear();
    }
}
