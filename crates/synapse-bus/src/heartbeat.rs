//! Periodic heartbeat sweep.
//!
//! The sweep marks components offline when their heartbeat goes stale
//! and re-probes live ones via their connection. It never removes a
//! component from the registry — offline is a status, not a deletion.

use crate::bus::MessageBus;
use chrono::{Duration as ChronoDuration, Utc};
use synapse_types::component::ComponentState;
use synapse_types::event::EventKind;
use tracing::{debug, warn};

/// A component is stale when its heartbeat is older than this many
/// multiples of the sweep interval.
const STALE_MULTIPLIER: i32 = 2;

/// Result of one heartbeat sweep.
#[derive(Debug, Clone, Default)]
pub struct HeartbeatSummary {
    /// Components examined (self excluded).
    pub checked: usize,
    /// Components online after the sweep.
    pub online: usize,
    /// Components newly marked offline this sweep.
    pub marked_offline: Vec<String>,
}

pub(crate) async fn sweep(bus: &MessageBus) -> HeartbeatSummary {
    let now = Utc::now();
    let interval = ChronoDuration::from_std(bus.config().heartbeat_interval)
        .unwrap_or_else(|_| ChronoDuration::seconds(30));
    let stale_after = interval * STALE_MULTIPLIER;

    let mut summary = HeartbeatSummary::default();
    for status in bus.components().all() {
        if status.id == bus.config().self_id {
            continue;
        }
        summary.checked += 1;

        let elapsed = now - status.last_heartbeat;
        if elapsed > stale_after {
            if status.state != ComponentState::Offline {
                warn!(
                    component = %status.id,
                    inactive_secs = elapsed.num_seconds(),
                    "Component heartbeat stale; marking offline"
                );
                bus.components()
                    .mark_state(&status.id, ComponentState::Offline);
                bus.events()
                    .emit(EventKind::ComponentOffline {
                        component_id: status.id.clone(),
                        inactive_secs: elapsed.num_seconds(),
                    })
                    .await;
                summary.marked_offline.push(status.id.clone());
            }
        } else if let Some(connection) = bus.connection(&status.id) {
            if connection.health_check().await {
                bus.components().touch_heartbeat(&status.id);
                debug!(component = %status.id, "Heartbeat OK");
            } else {
                // Leave the timestamp alone; the component goes stale
                // and is marked offline once it exceeds the threshold.
                debug!(component = %status.id, "Liveness probe failed");
            }
        }
    }

    summary.online = bus.components().online_count();
    bus.events()
        .emit(EventKind::HeartbeatComplete {
            checked: summary.checked,
            online: summary.online,
        })
        .await;
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BusConfig;
    use crate::connection::Connection;
    use crate::error::BusError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use synapse_events::EventBroadcaster;
    use synapse_types::component::{
        ComponentStatus, Message, ServiceEndpoint, TransportKind,
    };

    struct ProbeConnection {
        healthy: std::sync::atomic::AtomicBool,
    }

    impl ProbeConnection {
        fn new(healthy: bool) -> Arc<Self> {
            Arc::new(Self {
                healthy: std::sync::atomic::AtomicBool::new(healthy),
            })
        }

        fn set_healthy(&self, healthy: bool) {
            self.healthy
                .store(healthy, std::sync::atomic::Ordering::Relaxed);
        }
    }

    #[async_trait]
    impl Connection for ProbeConnection {
        async fn send(&self, _message: &Message) -> Result<serde_json::Value, BusError> {
            Ok(json!({}))
        }
        async fn health_check(&self) -> bool {
            self.healthy.load(std::sync::atomic::Ordering::Relaxed)
        }
    }

    fn endpoint(id: &str) -> ServiceEndpoint {
        ServiceEndpoint {
            component_id: id.to_string(),
            transport: TransportKind::RequestResponse,
            address: format!("http://localhost:0/{id}"),
            auth: None,
            health_path: Some("/healthz".to_string()),
            capabilities: vec![],
        }
    }

    fn bus(interval: Duration) -> MessageBus {
        let config = BusConfig {
            heartbeat_interval: interval,
            ..Default::default()
        };
        MessageBus::new(config, Arc::new(EventBroadcaster::new()))
    }

    fn stale_status(id: &str, age: chrono::Duration) -> ComponentStatus {
        let mut status = ComponentStatus::new(id, id, ComponentState::Online);
        status.last_heartbeat = Utc::now() - age;
        status
    }

    #[tokio::test]
    async fn test_stale_component_marked_offline_once() {
        let bus = bus(Duration::from_millis(100));
        bus.components()
            .register(stale_status("slow", chrono::Duration::seconds(10)));

        let summary = bus.heartbeat_sweep().await;
        assert_eq!(summary.checked, 1);
        assert_eq!(summary.marked_offline, vec!["slow".to_string()]);
        assert_eq!(
            bus.components().get("slow").unwrap().state,
            ComponentState::Offline
        );
        // Still in the registry: offline is a status, not a deletion.
        assert_eq!(bus.components().total_count(), 1);

        // A second sweep does not re-announce the transition.
        let summary = bus.heartbeat_sweep().await;
        assert!(summary.marked_offline.is_empty());
    }

    #[tokio::test]
    async fn test_fresh_component_not_marked() {
        let bus = bus(Duration::from_secs(30));
        bus.components()
            .register(stale_status("fresh", chrono::Duration::seconds(45)));

        // 45s elapsed < 2 x 30s interval: not stale.
        let summary = bus.heartbeat_sweep().await;
        assert!(summary.marked_offline.is_empty());
        assert_eq!(
            bus.components().get("fresh").unwrap().state,
            ComponentState::Online
        );
    }

    #[tokio::test]
    async fn test_probe_refreshes_heartbeat() {
        let bus = bus(Duration::from_secs(30));
        bus.connect_with(&endpoint("alive"), ProbeConnection::new(true))
            .await
            .unwrap();
        let before = bus.components().get("alive").unwrap().last_heartbeat;

        tokio::time::sleep(Duration::from_millis(20)).await;
        bus.heartbeat_sweep().await;

        let after = bus.components().get("alive").unwrap().last_heartbeat;
        assert!(after > before);
    }

    #[tokio::test]
    async fn test_failed_probe_leaves_heartbeat_stale() {
        let bus = bus(Duration::from_secs(30));
        let connection = ProbeConnection::new(true);
        bus.connect_with(&endpoint("flaky"), connection.clone())
            .await
            .unwrap();
        connection.set_healthy(false);
        let before = bus.components().get("flaky").unwrap().last_heartbeat;

        bus.heartbeat_sweep().await;
        let after = bus.components().get("flaky").unwrap().last_heartbeat;
        assert_eq!(after, before);
    }

    #[tokio::test]
    async fn test_self_is_skipped() {
        let bus = bus(Duration::from_millis(100));
        let self_id = bus.config().self_id.clone();
        bus.components()
            .register(stale_status(&self_id, chrono::Duration::seconds(10)));

        let summary = bus.heartbeat_sweep().await;
        assert_eq!(summary.checked, 0);
        assert_eq!(
            bus.components().get(&self_id).unwrap().state,
            ComponentState::Online
        );
    }
}
