//! Built-in middlewares: logging, argument validation, rate limiting

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::Value;

use super::{Middleware, MiddlewareError, ToolCallInfo};

// ============================================================================
// Logging
// ============================================================================

/// Records tool entry, exit, and error through the process logger
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before_tool_call(&self, call: &ToolCallInfo) -> Result<(), MiddlewareError> {
        tracing::info!(
            tool = %call.tool_name,
            session = call.session_id.as_deref().unwrap_or("-"),
            "Tool call started"
        );
        Ok(())
    }

    async fn after_tool_call(
        &self,
        call: &ToolCallInfo,
        _result: &Value,
    ) -> Result<(), MiddlewareError> {
        tracing::info!(tool = %call.tool_name, "Tool call completed");
        Ok(())
    }

    async fn on_error(&self, error: &str, context: &str, _detail: Option<&Value>) {
        tracing::error!(tool = %context, error = %error, "Tool call failed");
    }
}

// ============================================================================
// Argument validation
// ============================================================================

/// Asserts tool arguments are a JSON object (not null, not an array)
#[derive(Debug, Default)]
pub struct ValidationMiddleware;

impl ValidationMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for ValidationMiddleware {
    fn name(&self) -> &str {
        "validation"
    }

    async fn before_tool_call(&self, call: &ToolCallInfo) -> Result<(), MiddlewareError> {
        if call.params.is_object() {
            Ok(())
        } else {
            Err(MiddlewareError::InvalidArguments {
                tool: call.tool_name.clone(),
                reason: format!("arguments must be an object, got {}", json_kind(&call.params)),
            })
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Counter key granularity
///
/// The default keys by tool name only, shared across all callers. Keying
/// per session or per user widens the key with the caller identity from
/// [`ToolCallInfo`]; calls without that identity fall back to a shared
/// `"anonymous"` bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RateLimitKey {
    #[default]
    PerTool,
    PerSession,
    PerUser,
}

#[derive(Debug, Clone, Copy)]
struct WindowSlot {
    count: u32,
    reset_at: Instant,
}

/// Sliding-window rate limiter over tool calls
///
/// Semantics per key: if the window expired, reset to `{1, now + window}`;
/// otherwise fail once `max_calls` is reached, else increment. The
/// read-check-increment runs under one lock so the limit holds under
/// contention.
pub struct RateLimitMiddleware {
    max_calls: u32,
    window: Duration,
    key: RateLimitKey,
    slots: Mutex<HashMap<String, WindowSlot>>,
}

impl RateLimitMiddleware {
    pub fn new(max_calls: u32, window: Duration) -> Self {
        Self::with_key(max_calls, window, RateLimitKey::PerTool)
    }

    pub fn with_key(max_calls: u32, window: Duration, key: RateLimitKey) -> Self {
        Self {
            max_calls,
            window,
            key,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn counter_key(&self, call: &ToolCallInfo) -> String {
        match self.key {
            RateLimitKey::PerTool => call.tool_name.clone(),
            RateLimitKey::PerSession => format!(
                "{}|{}",
                call.session_id.as_deref().unwrap_or("anonymous"),
                call.tool_name
            ),
            RateLimitKey::PerUser => format!(
                "{}|{}",
                call.user_id.as_deref().unwrap_or("anonymous"),
                call.tool_name
            ),
        }
    }

    fn acquire_at(&self, key: &str, tool: &str, now: Instant) -> Result<(), MiddlewareError> {
        let mut slots = self.slots.lock().unwrap();
        match slots.get_mut(key) {
            Some(slot) if now <= slot.reset_at => {
                if slot.count >= self.max_calls {
                    return Err(MiddlewareError::RateLimited(tool.to_string()));
                }
                slot.count += 1;
                Ok(())
            }
            _ => {
                slots.insert(
                    key.to_string(),
                    WindowSlot {
                        count: 1,
                        reset_at: now + self.window,
                    },
                );
                Ok(())
            }
        }
    }

    /// Calls left in the current window, if one is open
    pub fn remaining(&self, key: &str) -> Option<u32> {
        let slots = self.slots.lock().unwrap();
        slots.get(key).map(|slot| {
            if Instant::now() > slot.reset_at {
                self.max_calls
            } else {
                self.max_calls.saturating_sub(slot.count)
            }
        })
    }
}

#[async_trait]
impl Middleware for RateLimitMiddleware {
    fn name(&self) -> &str {
        "rate-limit"
    }

    async fn before_tool_call(&self, call: &ToolCallInfo) -> Result<(), MiddlewareError> {
        let key = self.counter_key(call);
        self.acquire_at(&key, &call.tool_name, Instant::now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn validation_rejects_non_object_arguments() {
        let middleware = ValidationMiddleware::new();
        for bad in [json!(null), json!([1, 2]), json!("text"), json!(5)] {
            let call = ToolCallInfo::new("demo:echo", bad);
            let err = middleware.before_tool_call(&call).await.unwrap_err();
            assert!(matches!(err, MiddlewareError::InvalidArguments { .. }));
        }
        let ok = ToolCallInfo::new("demo:echo", json!({}));
        assert!(middleware.before_tool_call(&ok).await.is_ok());
    }

    #[test]
    fn limit_trips_at_max_calls_inside_window() {
        let limiter = RateLimitMiddleware::new(2, Duration::from_millis(60_000));
        let now = Instant::now();

        limiter.acquire_at("demo:echo", "demo:echo", now).unwrap();
        limiter.acquire_at("demo:echo", "demo:echo", now).unwrap();
        let err = limiter
            .acquire_at("demo:echo", "demo:echo", now)
            .unwrap_err();
        assert_eq!(err.to_string(), "Rate limit exceeded for tool demo:echo");
    }

    #[test]
    fn window_reopens_just_past_expiry() {
        let window = Duration::from_millis(60_000);
        let limiter = RateLimitMiddleware::new(1, window);
        let start = Instant::now();

        limiter.acquire_at("demo:echo", "demo:echo", start).unwrap();
        // At the window edge the counter still applies...
        assert!(limiter
            .acquire_at("demo:echo", "demo:echo", start + window)
            .is_err());
        // ...one millisecond later it resets.
        limiter
            .acquire_at(
                "demo:echo",
                "demo:echo",
                start + window + Duration::from_millis(1),
            )
            .unwrap();
    }

    #[test]
    fn windows_are_independent_per_tool() {
        let limiter = RateLimitMiddleware::new(1, Duration::from_millis(60_000));
        let now = Instant::now();
        limiter.acquire_at("demo:echo", "demo:echo", now).unwrap();
        limiter
            .acquire_at("demo:forecast", "demo:forecast", now)
            .unwrap();
        assert!(limiter.acquire_at("demo:echo", "demo:echo", now).is_err());
    }

    #[tokio::test]
    async fn per_session_key_isolates_callers() {
        let limiter = RateLimitMiddleware::with_key(
            1,
            Duration::from_millis(60_000),
            RateLimitKey::PerSession,
        );

        let alice = ToolCallInfo::new("demo:echo", json!({}))
            .with_caller(Some("session-a".into()), None);
        let bob = ToolCallInfo::new("demo:echo", json!({}))
            .with_caller(Some("session-b".into()), None);

        limiter.before_tool_call(&alice).await.unwrap();
        limiter.before_tool_call(&bob).await.unwrap();
        assert!(limiter.before_tool_call(&alice).await.is_err());
    }

    #[test]
    fn remaining_reports_open_window() {
        let limiter = RateLimitMiddleware::new(3, Duration::from_millis(60_000));
        assert_eq!(limiter.remaining("demo:echo"), None);
        let now = Instant::now();
        limiter.acquire_at("demo:echo", "demo:echo", now).unwrap();
        assert_eq!(limiter.remaining("demo:echo"), Some(2));
    }
}
