//! Request/response types for a single host-guest call.
//!
//! A [`CognitiveResponse`] is immutable once constructed: it is produced
//! per invocation and consumed by the caller, never updated in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Input handed to the orchestrator's `process_input`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensoryInput {
    /// Arbitrary structured payload. Serialized to text before it
    /// crosses the guest boundary.
    pub data: serde_json::Value,
    /// Optional task hint forwarded to the cognitive shell.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task: Option<String>,
}

impl SensoryInput {
    /// Wrap a JSON payload with no task hint.
    pub fn new(data: serde_json::Value) -> Self {
        Self { data, task: None }
    }

    /// Wrap a JSON payload with a task hint.
    pub fn with_task(data: serde_json::Value, task: impl Into<String>) -> Self {
        Self {
            data,
            task: Some(task.into()),
        }
    }
}

/// Per-call context crossing the boundary alongside the input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallContext {
    /// Session identifier, stable across calls within one conversation.
    pub session_id: String,
    /// When the call was issued.
    pub timestamp: DateTime<Utc>,
    /// Optional capability hint for the guest's dispatcher.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability: Option<String>,
}

impl CallContext {
    /// Create a context for the given session, stamped now.
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            timestamp: Utc::now(),
            capability: None,
        }
    }

    /// Attach a capability hint.
    pub fn with_capability(mut self, capability: impl Into<String>) -> Self {
        self.capability = Some(capability.into());
        self
    }
}

/// Which path produced a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    /// A loaded guest module answered.
    Module,
    /// The in-process fallback engine answered.
    Fallback,
}

/// Result of a single `process_input` invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CognitiveResponse {
    /// Whether the call succeeded.
    pub success: bool,
    /// The response payload (guest output or fallback echo).
    pub payload: serde_json::Value,
    /// Error detail when `success` is false.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Confidence score in [0, 1].
    pub confidence: f32,
    /// Wall-clock processing duration in milliseconds.
    pub processing_time_ms: u64,
    /// Which path produced this response.
    pub source: ResponseSource,
}

impl CognitiveResponse {
    /// Build a failed response with the given error detail.
    pub fn failure(error: impl Into<String>, source: ResponseSource) -> Self {
        Self {
            success: false,
            payload: serde_json::Value::Null,
            error: Some(error.into()),
            confidence: 0.0,
            processing_time_ms: 0,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_roundtrip() {
        let resp = CognitiveResponse {
            success: true,
            payload: serde_json::json!({"answer": 42}),
            error: None,
            confidence: 0.8,
            processing_time_ms: 12,
            source: ResponseSource::Module,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"module\""));
        let back: CognitiveResponse = serde_json::from_str(&json).unwrap();
        assert!(back.success);
        assert_eq!(back.source, ResponseSource::Module);
    }

    #[test]
    fn test_context_capability_hint() {
        let ctx = CallContext::new("sess-1").with_capability("execute");
        assert_eq!(ctx.capability.as_deref(), Some("execute"));
    }
}
