//! Ecosystem component, endpoint, and message envelope types.
//!
//! A [`ComponentStatus`] is the runtime record of an external service
//! participant; a [`ServiceEndpoint`] is its static reachability
//! descriptor. The two are registered independently and joined by
//! component id.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Lifecycle state of an ecosystem component.
///
/// Transitions: `Connecting → Online ⇄ Offline`. A component is never
/// deleted during a session, only marked offline or errored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentState {
    /// A connection attempt is in flight.
    Connecting,
    /// Reachable and heartbeating.
    Online,
    /// Unreachable or heartbeat-stale.
    Offline,
    /// A connection or probe failed with an error.
    Error,
}

/// Runtime status record for an ecosystem component.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentStatus {
    /// Unique component identifier.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Current lifecycle state.
    pub state: ComponentState,
    /// When a heartbeat was last observed. Zeroed (epoch) when the
    /// component was registered after a failed connect.
    pub last_heartbeat: DateTime<Utc>,
    /// Component version string.
    pub version: String,
    /// Capabilities the component advertises.
    pub capabilities: Vec<String>,
    /// Free-form metrics reported by the component.
    #[serde(default)]
    pub metrics: HashMap<String, serde_json::Value>,
}

impl ComponentStatus {
    /// Build a status record in the given state, heartbeat stamped now.
    pub fn new(id: impl Into<String>, name: impl Into<String>, state: ComponentState) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            state,
            last_heartbeat: Utc::now(),
            version: "0.0.0".to_string(),
            capabilities: Vec::new(),
            metrics: HashMap::new(),
        }
    }

    /// Zero the heartbeat timestamp (used when registering a component
    /// whose connection attempt failed).
    pub fn with_zeroed_heartbeat(mut self) -> Self {
        self.last_heartbeat = Utc.timestamp_opt(0, 0).single().unwrap_or_else(Utc::now);
        self
    }
}

/// Transport kind of a service endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TransportKind {
    /// Request/response over HTTP.
    RequestResponse,
    /// Server-push stream.
    PushStream,
    /// Direct peer-to-peer link.
    PeerToPeer,
}

/// Authentication descriptor for an endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointAuth {
    /// Scheme name (e.g., "bearer").
    pub scheme: String,
    /// Opaque credential, if the scheme carries one inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Static reachability descriptor for a component.
///
/// One-to-one with at most one live connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceEndpoint {
    /// The component this endpoint reaches.
    pub component_id: String,
    /// Transport kind.
    pub transport: TransportKind,
    /// Transport address (URL for request/response).
    pub address: String,
    /// Optional authentication descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<EndpointAuth>,
    /// Optional liveness-check path, relative to `address`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_path: Option<String>,
    /// Capabilities reachable through this endpoint.
    #[serde(default)]
    pub capabilities: Vec<String>,
}

/// Kind of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// An imperative command.
    Command,
    /// A read-only query.
    Query,
    /// A response correlated to an earlier message.
    Response,
    /// A broadcast notification.
    Event,
    /// A liveness heartbeat.
    Heartbeat,
}

/// Dispatch priority of a bus message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessagePriority {
    Low,
    Normal,
    High,
    Critical,
}

/// A bus envelope. Enqueued by any component, dequeued exactly once by
/// the dispatch loop, never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Generated message id.
    pub id: String,
    /// Sending component id.
    pub source: String,
    /// Receiving component id.
    pub target: String,
    /// Message kind.
    pub kind: MessageKind,
    /// JSON payload.
    pub payload: serde_json::Value,
    /// Creation timestamp.
    pub timestamp: DateTime<Utc>,
    /// Dispatch priority.
    pub priority: MessagePriority,
    /// Whether the sender expects a correlated response.
    pub requires_response: bool,
    /// For responses: the id of the message being answered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl Message {
    /// Build a new envelope with a generated id, stamped now.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        kind: MessageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            target: target.into(),
            kind,
            payload,
            timestamp: Utc::now(),
            priority: MessagePriority::Normal,
            requires_response: false,
            correlation_id: None,
        }
    }

    /// Mark this message as expecting a correlated response.
    pub fn expecting_response(mut self) -> Self {
        self.requires_response = true;
        self
    }

    /// Set the dispatch priority.
    pub fn with_priority(mut self, priority: MessagePriority) -> Self {
        self.priority = priority;
        self
    }

    /// Build a response envelope correlated to `request`.
    pub fn response_to(request: &Message, source: impl Into<String>, payload: serde_json::Value) -> Self {
        let mut msg = Self::new(source, request.source.clone(), MessageKind::Response, payload);
        msg.correlation_id = Some(request.id.clone());
        msg
    }
}
