//! Fluent tool builder
//!
//! Assembles a [`Tool`] from a sequence of typed parameter descriptions and
//! a handler. Parameter kinds are a closed tagged union; the builder turns
//! them into the JSON Schema the kernel advertises through `tools/list`.
//! Building without a handler is an error, not a panic.

use std::future::Future;
use std::sync::Arc;

use serde_json::{json, Value};

use super::{HostError, Tool, ToolHandlerFn, ToolSchema};
use crate::kernel::context::CallContext;

/// Supported parameter kinds
#[derive(Debug, Clone, PartialEq)]
pub enum ParamKind {
    String,
    Number { min: Option<f64>, max: Option<f64> },
    Boolean,
    Enum { values: Vec<String> },
    Array { items: Option<Box<ParamKind>> },
    Object,
}

impl ParamKind {
    fn to_schema(&self, description: &str) -> Value {
        let mut schema = match self {
            ParamKind::String => json!({"type": "string"}),
            ParamKind::Number { min, max } => {
                let mut s = json!({"type": "number"});
                if let Some(min) = min {
                    s["minimum"] = json!(min);
                }
                if let Some(max) = max {
                    s["maximum"] = json!(max);
                }
                s
            }
            ParamKind::Boolean => json!({"type": "boolean"}),
            ParamKind::Enum { values } => json!({"type": "string", "enum": values}),
            ParamKind::Array { items } => {
                let mut s = json!({"type": "array"});
                if let Some(items) = items {
                    s["items"] = items.to_schema("");
                }
                s
            }
            ParamKind::Object => json!({"type": "object"}),
        };
        if !description.is_empty() {
            schema["description"] = json!(description);
        }
        schema
    }
}

#[derive(Debug, Clone)]
struct ParamSpec {
    name: String,
    description: String,
    kind: ParamKind,
    required: bool,
}

/// Builder producing [`Tool`] records
///
/// ```ignore
/// let tool = ToolBuilder::new("echo", "Echo text back")
///     .string_param("text", "The text to echo", true)
///     .handler(|params, _ctx| async move {
///         Ok(params.get("text").cloned().unwrap_or_default())
///     })
///     .build()?;
/// ```
pub struct ToolBuilder {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    handler: Option<ToolHandlerFn>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            params: Vec::new(),
            handler: None,
        }
    }

    fn param(mut self, name: &str, description: &str, kind: ParamKind, required: bool) -> Self {
        self.params.push(ParamSpec {
            name: name.to_string(),
            description: description.to_string(),
            kind,
            required,
        });
        self
    }

    pub fn string_param(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, ParamKind::String, required)
    }

    pub fn number_param(
        self,
        name: &str,
        description: &str,
        required: bool,
        min: Option<f64>,
        max: Option<f64>,
    ) -> Self {
        self.param(name, description, ParamKind::Number { min, max }, required)
    }

    pub fn boolean_param(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, ParamKind::Boolean, required)
    }

    pub fn enum_param(
        self,
        name: &str,
        description: &str,
        required: bool,
        values: &[&str],
    ) -> Self {
        self.param(
            name,
            description,
            ParamKind::Enum {
                values: values.iter().map(|s| s.to_string()).collect(),
            },
            required,
        )
    }

    pub fn array_param(
        self,
        name: &str,
        description: &str,
        required: bool,
        items: Option<ParamKind>,
    ) -> Self {
        self.param(
            name,
            description,
            ParamKind::Array {
                items: items.map(Box::new),
            },
            required,
        )
    }

    pub fn object_param(self, name: &str, description: &str, required: bool) -> Self {
        self.param(name, description, ParamKind::Object, required)
    }

    /// Attach the handler invoked by `tools/call`
    pub fn handler<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, HostError>> + Send + 'static,
    {
        self.handler = Some(Arc::new(move |params, ctx| Box::pin(f(params, ctx))));
        self
    }

    /// Produce the tool; fails if no handler was set
    pub fn build(self) -> Result<Tool, HostError> {
        let handler = self.handler.ok_or(HostError::MissingHandler {
            tool: self.name.clone(),
        })?;

        let mut schema = ToolSchema::empty();
        for spec in &self.params {
            schema
                .properties
                .insert(spec.name.clone(), spec.kind.to_schema(&spec.description));
            if spec.required {
                schema.required.push(spec.name.clone());
            }
        }

        Ok(Tool {
            name: self.name,
            description: self.description,
            input_schema: schema,
            handler,
        })
    }
}
