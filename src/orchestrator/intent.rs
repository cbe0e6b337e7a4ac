//! Intent detection
//!
//! The detector decides whether a message should switch the session onto a
//! different workflow. The default is rule-based: exit-signal scanning,
//! trigger matching with a graded confidence score, and lightweight entity
//! extraction. Detection is a pure function of the message, the registry,
//! and the session's active workflow.
//!
//! Matching tiers for a trigger against a lowercased message:
//!
//! - exact match -> 1.0
//! - contained as a phrase -> `0.8 + (trigger_len / message_len) * 0.2`,
//!   so a trigger that dominates the message scores close to exact
//! - fuzzy (every word of the trigger occurs somewhere) -> 0.6
//! - otherwise -> 0.0
//!
//! A switch only happens above 0.7. Note the fuzzy tier is deliberately
//! loose - a trigger like "help me" fuzzily matches any message containing
//! both words anywhere - and 0.6 sits below the switch threshold on
//! purpose: the threshold is the only safety net.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::{json, Map, Value};

use super::registry::WorkflowRegistry;
use super::types::{Entity, Intent, IntentAnalysis, UserSession, WorkflowDefinition};

/// Messages that end the active workflow regardless of triggers
const EXIT_SIGNALS: &[&str] = &[
    "done",
    "finished",
    "complete",
    "exit",
    "stop",
    "end session",
    "quit",
];

/// Confidence above which a workflow switch is performed
pub const SWITCH_THRESHOLD: f64 = 0.7;

/// A function of (message, session) deciding whether to switch workflow
#[async_trait]
pub trait IntentDetector: Send + Sync {
    async fn analyze_message(&self, message: &str, session: &UserSession) -> IntentAnalysis;
}

/// Rule-based baseline detector
pub struct RuleBasedIntentDetector {
    registry: Arc<WorkflowRegistry>,
    email_re: Regex,
    url_re: Regex,
    number_re: Regex,
    character_re: Regex,
    topic_re: Regex,
}

impl RuleBasedIntentDetector {
    pub fn new(registry: Arc<WorkflowRegistry>) -> Self {
        Self {
            registry,
            email_re: Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap(),
            url_re: Regex::new(r"https?://[^\s]+").unwrap(),
            number_re: Regex::new(r"\b\d+(?:\.\d+)?\b").unwrap(),
            character_re: Regex::new(r"(?:character|person|called|named)\s+([A-Z][a-z]+)")
                .unwrap(),
            topic_re: Regex::new(r"(?i)(?:about|involving|featuring)\s+(\w+(?:\s+\w+)?)").unwrap(),
        }
    }

    /// Score one trigger against the lowercased message
    fn trigger_confidence(trigger: &str, message: &str) -> f64 {
        let trigger = trigger.to_lowercase();
        if trigger.len() > message.len() {
            return 0.0;
        }
        if message.trim() == trigger {
            return 1.0;
        }
        if message.contains(&trigger) {
            return 0.8 + (trigger.len() as f64 / message.len() as f64) * 0.2;
        }
        // Fuzzy: every word of the trigger appears somewhere in the message.
        if trigger
            .split_whitespace()
            .all(|word| message.contains(word))
        {
            return 0.6;
        }
        0.0
    }

    fn best_confidence(workflow: &WorkflowDefinition, message: &str) -> f64 {
        workflow
            .triggers
            .iter()
            .map(|t| Self::trigger_confidence(t, message))
            .fold(0.0, f64::max)
    }

    fn is_exit_signal(&self, message: &str, session: &UserSession) -> bool {
        if EXIT_SIGNALS.iter().any(|signal| message.contains(signal)) {
            return true;
        }
        // A workflow can declare its own exit phrases.
        session
            .active_workflow
            .as_deref()
            .and_then(|id| self.registry.get(id))
            .map(|w| {
                w.exit_signals
                    .iter()
                    .any(|signal| message.contains(&signal.to_lowercase()))
            })
            .unwrap_or(false)
    }

    fn extract_entities(&self, message: &str) -> Vec<Entity> {
        let mut entities = Vec::new();
        for (entity_type, re, confidence) in [
            ("email", &self.email_re, 0.95),
            ("url", &self.url_re, 0.95),
            ("number", &self.number_re, 0.8),
        ] {
            for found in re.find_iter(message) {
                entities.push(Entity {
                    entity_type: entity_type.to_string(),
                    value: found.as_str().to_string(),
                    confidence,
                    start_index: Some(found.start()),
                    end_index: Some(found.end()),
                });
            }
        }
        entities
    }

    /// Workflow-specific field extraction keyed off the workflow id
    fn extract_workflow_data(&self, workflow: &WorkflowDefinition, message: &str) -> Option<Value> {
        let mut data = Map::new();
        if workflow.id.contains("character") {
            if let Some(captures) = self.character_re.captures(message) {
                data.insert("characterName".to_string(), json!(captures[1].to_string()));
            }
        }
        if workflow.id.contains("story") {
            if let Some(captures) = self.topic_re.captures(message) {
                data.insert("topic".to_string(), json!(captures[1].to_string()));
            }
        }
        if data.is_empty() {
            None
        } else {
            Some(Value::Object(data))
        }
    }
}

#[async_trait]
impl IntentDetector for RuleBasedIntentDetector {
    async fn analyze_message(&self, message: &str, session: &UserSession) -> IntentAnalysis {
        let lowered = message.to_lowercase();

        // Exit signals only mean something inside an active workflow.
        if session.active_workflow.is_some() && self.is_exit_signal(&lowered, session) {
            return IntentAnalysis {
                confidence: 0.9,
                intents: vec![Intent {
                    name: "exit_workflow".to_string(),
                    confidence: 0.9,
                    parameters: None,
                }],
                entities: Vec::new(),
                should_switch_workflow: true,
                target_workflow: None,
                extracted_data: Some(json!({ "reason": "user_requested" })),
            };
        }

        // Substring hits first (registration order), then a fuzzy scan so
        // scattered trigger words still surface a candidate.
        let candidate = self
            .registry
            .find_by_trigger(message)
            .into_iter()
            .next()
            .or_else(|| {
                self.registry
                    .list()
                    .into_iter()
                    .find(|w| Self::best_confidence(w, &lowered) > 0.0)
            });

        if let Some(workflow) = candidate {
            let workflow = &workflow;
            let confidence = Self::best_confidence(workflow, &lowered);

            let mut data = match self.extract_workflow_data(workflow, message) {
                Some(Value::Object(map)) => map,
                _ => Map::new(),
            };
            let entities = self.extract_entities(message);
            if !entities.is_empty() {
                data.insert(
                    "entities".to_string(),
                    serde_json::to_value(&entities).unwrap_or(Value::Null),
                );
            }
            let extracted = if data.is_empty() {
                None
            } else {
                Some(Value::Object(data))
            };

            return IntentAnalysis {
                confidence,
                intents: vec![Intent {
                    name: "switch_workflow".to_string(),
                    confidence,
                    parameters: Some(json!({ "workflow": workflow.id })),
                }],
                entities,
                should_switch_workflow: confidence > SWITCH_THRESHOLD,
                target_workflow: Some(workflow.id.clone()),
                extracted_data: extracted,
            };
        }

        IntentAnalysis {
            confidence: 0.1,
            intents: vec![Intent {
                name: "continue_current".to_string(),
                confidence: 0.1,
                parameters: None,
            }],
            entities: Vec::new(),
            should_switch_workflow: false,
            target_workflow: None,
            extracted_data: None,
        }
    }
}
