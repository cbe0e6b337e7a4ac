//! Composable parameter validation
//!
//! A small rule library plugins can put in front of their handlers. Rules
//! are accumulated per field through a builder; a failed rule produces a
//! [`ValidationError`] carrying the field, the offending value, and a
//! message. `validated_handler` wraps an existing handler so validation
//! runs before it.
//!
//! The kernel never applies this toolkit on its own; it is an optional
//! collaborator for plugin authors.

use std::future::Future;
use std::sync::Arc;

use regex::Regex;
use serde_json::Value;
use thiserror::Error;

use super::{HostError, ToolHandlerFn};
use crate::kernel::context::CallContext;

/// Failure raised by a validation rule
#[derive(Debug, Clone, Error)]
#[error("Validation failed for '{field}': {message}")]
pub struct ValidationError {
    pub field: String,
    pub value: Value,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, value: Option<&Value>, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            value: value.cloned().unwrap_or(Value::Null),
            message: message.into(),
        }
    }
}

/// A single-field validation rule
#[derive(Debug, Clone)]
pub enum Rule {
    Required,
    TypeString,
    TypeNumber,
    TypeBoolean,
    TypeArray,
    TypeObject,
    MinLength(usize),
    MaxLength(usize),
    Min(f64),
    Max(f64),
    Email,
    Url,
    OneOf(Vec<Value>),
    Pattern(Regex),
}

impl Rule {
    fn check(&self, field: &str, value: Option<&Value>) -> Result<(), ValidationError> {
        // Absent fields only trip Required; other rules pass vacuously.
        let present = match value {
            None | Some(Value::Null) => {
                if matches!(self, Rule::Required) {
                    return Err(ValidationError::new(field, value, "field is required"));
                }
                return Ok(());
            }
            Some(v) => v,
        };

        match self {
            Rule::Required => Ok(()),
            Rule::TypeString => expect(present.is_string(), field, present, "must be a string"),
            Rule::TypeNumber => expect(present.is_number(), field, present, "must be a number"),
            Rule::TypeBoolean => expect(present.is_boolean(), field, present, "must be a boolean"),
            Rule::TypeArray => expect(present.is_array(), field, present, "must be an array"),
            Rule::TypeObject => expect(present.is_object(), field, present, "must be an object"),
            Rule::MinLength(min) => {
                let len = present.as_str().map(str::len).unwrap_or(0);
                expect(
                    len >= *min,
                    field,
                    present,
                    format!("must be at least {} characters", min),
                )
            }
            Rule::MaxLength(max) => {
                let len = present.as_str().map(str::len).unwrap_or(0);
                expect(
                    len <= *max,
                    field,
                    present,
                    format!("must be at most {} characters", max),
                )
            }
            Rule::Min(min) => {
                let n = present.as_f64().unwrap_or(f64::NEG_INFINITY);
                expect(n >= *min, field, present, format!("must be >= {}", min))
            }
            Rule::Max(max) => {
                let n = present.as_f64().unwrap_or(f64::INFINITY);
                expect(n <= *max, field, present, format!("must be <= {}", max))
            }
            Rule::Email => {
                let ok = present
                    .as_str()
                    .map(|s| email_regex().is_match(s))
                    .unwrap_or(false);
                expect(ok, field, present, "must be a valid email address")
            }
            Rule::Url => {
                let ok = present
                    .as_str()
                    .map(|s| url_regex().is_match(s))
                    .unwrap_or(false);
                expect(ok, field, present, "must be a valid url")
            }
            Rule::OneOf(allowed) => expect(
                allowed.contains(present),
                field,
                present,
                format!("must be one of {:?}", allowed),
            ),
            Rule::Pattern(re) => {
                let ok = present.as_str().map(|s| re.is_match(s)).unwrap_or(false);
                expect(ok, field, present, format!("must match pattern {}", re))
            }
        }
    }
}

fn expect(
    ok: bool,
    field: &str,
    value: &Value,
    message: impl Into<String>,
) -> Result<(), ValidationError> {
    if ok {
        Ok(())
    } else {
        Err(ValidationError::new(field, Some(value), message))
    }
}

fn email_regex() -> Regex {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").unwrap()
}

fn url_regex() -> Regex {
    Regex::new(r"^https?://\S+$").unwrap()
}

/// Rules accumulated per field
#[derive(Debug, Clone, Default)]
pub struct Validator {
    fields: Vec<(String, Vec<Rule>)>,
}

impl Validator {
    pub fn builder() -> ValidatorBuilder {
        ValidatorBuilder {
            validator: Validator::default(),
            current: None,
        }
    }

    /// Check `params` (an object) against every rule; first failure wins
    pub fn validate(&self, params: &Value) -> Result<(), ValidationError> {
        for (field, rules) in &self.fields {
            let value = params.get(field);
            for rule in rules {
                rule.check(field, value)?;
            }
        }
        Ok(())
    }
}

/// Accumulates rules field by field
pub struct ValidatorBuilder {
    validator: Validator,
    current: Option<(String, Vec<Rule>)>,
}

impl ValidatorBuilder {
    /// Start a new field; rules added afterwards apply to it
    pub fn field(mut self, name: &str) -> Self {
        self.flush();
        self.current = Some((name.to_string(), Vec::new()));
        self
    }

    fn rule(mut self, rule: Rule) -> Self {
        if let Some((_, rules)) = self.current.as_mut() {
            rules.push(rule);
        }
        self
    }

    pub fn required(self) -> Self {
        self.rule(Rule::Required)
    }

    pub fn string(self) -> Self {
        self.rule(Rule::TypeString)
    }

    pub fn number(self) -> Self {
        self.rule(Rule::TypeNumber)
    }

    pub fn boolean(self) -> Self {
        self.rule(Rule::TypeBoolean)
    }

    pub fn array(self) -> Self {
        self.rule(Rule::TypeArray)
    }

    pub fn object(self) -> Self {
        self.rule(Rule::TypeObject)
    }

    pub fn min_length(self, min: usize) -> Self {
        self.rule(Rule::MinLength(min))
    }

    pub fn max_length(self, max: usize) -> Self {
        self.rule(Rule::MaxLength(max))
    }

    pub fn min(self, min: f64) -> Self {
        self.rule(Rule::Min(min))
    }

    pub fn max(self, max: f64) -> Self {
        self.rule(Rule::Max(max))
    }

    pub fn email(self) -> Self {
        self.rule(Rule::Email)
    }

    pub fn url(self) -> Self {
        self.rule(Rule::Url)
    }

    pub fn one_of(self, allowed: Vec<Value>) -> Self {
        self.rule(Rule::OneOf(allowed))
    }

    pub fn pattern(self, pattern: &str) -> Self {
        let re = Regex::new(pattern).expect("invalid validation pattern");
        self.rule(Rule::Pattern(re))
    }

    fn flush(&mut self) {
        if let Some(entry) = self.current.take() {
            self.validator.fields.push(entry);
        }
    }

    pub fn build(mut self) -> Validator {
        self.flush();
        self.validator
    }
}

/// Wrap a handler so the validator runs first
///
/// The wrapped handler surfaces validation failures as handler errors, so
/// the kernel reports them like any other tool failure.
pub fn validated_handler<F, Fut>(validator: Validator, f: F) -> ToolHandlerFn
where
    F: Fn(Value, CallContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, HostError>> + Send + 'static,
{
    let f = Arc::new(f);
    Arc::new(move |params, ctx| {
        let validator = validator.clone();
        let f = Arc::clone(&f);
        Box::pin(async move {
            validator.validate(&params)?;
            f(params, ctx).await
        })
    })
}
