//! End-to-end ecosystem scenarios: registration, fan-out connect,
//! liveness, and correlated messaging across several components.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use synapse_bus::{BusConfig, BusError, Connection, MessageBus, SendOutcome};
use synapse_events::EventBroadcaster;
use synapse_types::component::{
    ComponentState, Message, MessageKind, ServiceEndpoint, TransportKind,
};
use synapse_types::event::EventKind;

struct StubService {
    healthy: AtomicBool,
    reply: serde_json::Value,
}

impl StubService {
    fn new(healthy: bool, reply: serde_json::Value) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(healthy),
            reply,
        })
    }
}

#[async_trait]
impl Connection for StubService {
    async fn send(&self, _message: &Message) -> Result<serde_json::Value, BusError> {
        Ok(self.reply.clone())
    }

    async fn health_check(&self) -> bool {
        self.healthy.load(Ordering::Relaxed)
    }
}

fn endpoint(id: &str) -> ServiceEndpoint {
    ServiceEndpoint {
        component_id: id.to_string(),
        transport: TransportKind::RequestResponse,
        address: format!("http://localhost:0/{id}"),
        auth: None,
        health_path: Some("/healthz".to_string()),
        capabilities: vec![format!("{id}-ops")],
    }
}

/// Two endpoints, both attempted; one's liveness probe always fails.
/// Exactly one component ends up online, one offline, and the failure
/// never prevents the other connection.
#[tokio::test]
async fn one_online_one_offline() {
    let events = Arc::new(EventBroadcaster::new());
    let config = BusConfig {
        heartbeat_interval: Duration::from_millis(100),
        dispatch_idle_delay: Duration::from_millis(5),
        response_timeout: Duration::from_millis(500),
        ..Default::default()
    };
    let bus = Arc::new(MessageBus::new(config, events.clone()).with_connection_factory(
        Box::new(|endpoint| {
            let healthy = endpoint.component_id == "wallet";
            Ok(StubService::new(healthy, json!({"ok": true})) as Arc<dyn Connection>)
        }),
    ));

    bus.register_endpoint(endpoint("wallet"));
    bus.register_endpoint(endpoint("oracle"));

    let report = bus.connect_all().await;
    assert_eq!(report.attempted, 2);
    assert_eq!(report.connected, 1);
    assert_eq!(report.failed, 1);

    let status = bus.ecosystem_status();
    assert_eq!(status.total_components, 2);
    assert_eq!(status.online_components, 1);
    assert_eq!(
        bus.components().get("wallet").unwrap().state,
        ComponentState::Online
    );
    let oracle = bus.components().get("oracle").unwrap();
    assert_eq!(oracle.state, ComponentState::Offline);
    assert_eq!(oracle.last_heartbeat.timestamp(), 0);

    // Heartbeat sweeps keep the healthy component online and never
    // delete the dead one.
    bus.heartbeat_sweep().await;
    bus.heartbeat_sweep().await;
    let status = bus.ecosystem_status();
    assert_eq!(status.total_components, 2);
    assert_eq!(status.online_components, 1);

    let history = events.history(50).await;
    assert!(history
        .iter()
        .any(|e| matches!(e.kind, EventKind::HeartbeatComplete { .. })));
}

/// A command routed to a live component resolves with the component's
/// reply; the same command to the dead component fails fast.
#[tokio::test]
async fn correlated_commands_route_by_liveness() {
    let events = Arc::new(EventBroadcaster::new());
    let config = BusConfig {
        dispatch_idle_delay: Duration::from_millis(5),
        response_timeout: Duration::from_secs(5),
        ..Default::default()
    };
    let bus = Arc::new(MessageBus::new(config, events));

    bus.connect_with(
        &endpoint("wallet"),
        StubService::new(true, json!({"executed": "transfer", "ok": true})),
    )
    .await
    .unwrap();
    // The oracle's probe fails at connect time: registered offline,
    // no live connection.
    let err = bus
        .connect_with(&endpoint("oracle"), StubService::new(false, json!({})))
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::ConnectFailed { .. }));

    bus.start();

    let outcome = bus
        .send_message(
            Message::new(
                "shell",
                "wallet",
                MessageKind::Command,
                json!({"command": "transfer", "amount": 10}),
            )
            .expecting_response(),
        )
        .await
        .unwrap();
    match outcome {
        SendOutcome::Response(response) => {
            assert_eq!(response.payload["executed"], json!("transfer"));
        }
        other => panic!("expected response, got {other:?}"),
    }

    let err = bus
        .send_message(
            Message::new("shell", "oracle", MessageKind::Query, json!({"q": "price"}))
                .expecting_response(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BusError::TargetNotConnected(ref t) if t == "oracle"));

    bus.shutdown();
}
