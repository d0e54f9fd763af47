//! Lifecycle events announced on the event broadcaster.

use crate::module::{Dialect, ModuleId, ModuleRole};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub Uuid);

impl EventId {
    /// Create a new random EventId.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What happened.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EventKind {
    /// The cognitive-shell module became ready. `synthetic` is true when
    /// readiness was forced by the fallback path rather than a real load.
    CognitiveShellLoaded {
        module_id: Option<ModuleId>,
        dialect: Option<Dialect>,
        synthetic: bool,
    },
    /// A model module became ready.
    ModelLoaded {
        module_id: ModuleId,
        model_id: String,
        dialect: Dialect,
    },
    /// The orchestrator accepted `start()`.
    OrchestratorStarted,
    /// The orchestrator accepted `stop()`.
    OrchestratorStopped,
    /// A module was disposed.
    ModuleDisposed { role: ModuleRole },
    /// An adapter skill was applied to a module.
    SkillApplied { skill_id: String },
    /// An adapter skill failed to apply.
    SkillApplicationFailed { skill_id: String, reason: String },
    /// A component was registered on the bus.
    ComponentRegistered { component_id: String },
    /// A connection to a component's endpoint was established.
    ConnectionEstablished { component_id: String },
    /// A connection attempt to a component's endpoint failed.
    ConnectionFailed { component_id: String, reason: String },
    /// The heartbeat sweep marked a component offline.
    ComponentOffline {
        component_id: String,
        inactive_secs: i64,
    },
    /// A heartbeat sweep finished.
    HeartbeatComplete { checked: usize, online: usize },
    /// A guest module aborted. Carries the raw abort site.
    GuestAbort {
        module_id: ModuleId,
        message: String,
    },
}

/// A complete event: kind plus id and timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynapseEvent {
    /// Unique event id.
    pub id: EventId,
    /// When the event was created.
    pub timestamp: DateTime<Utc>,
    /// What happened.
    #[serde(flatten)]
    pub kind: EventKind,
}

impl SynapseEvent {
    /// Wrap a kind with a fresh id and timestamp.
    pub fn new(kind: EventKind) -> Self {
        Self {
            id: EventId::new(),
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = SynapseEvent::new(EventKind::SkillApplied {
            skill_id: "skill-42".to_string(),
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("skill_applied"));
        assert!(json.contains("skill-42"));
        let back: SynapseEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
    }

    #[test]
    fn test_synthetic_ready_event() {
        let event = SynapseEvent::new(EventKind::CognitiveShellLoaded {
            module_id: None,
            dialect: None,
            synthetic: true,
        });
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"synthetic\":true"));
    }
}
