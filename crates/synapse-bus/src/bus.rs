//! The message bus: queue, dispatch loop, and correlated requests.

use crate::config::BusConfig;
use crate::connection::{Connection, HttpConnection};
use crate::error::BusError;
use crate::heartbeat::{self, HeartbeatSummary};
use crate::registry::{ComponentRegistry, EndpointRegistry};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::future::join_all;
use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use synapse_events::EventBroadcaster;
use synapse_types::component::{
    ComponentState, ComponentStatus, Message, MessageKind, ServiceEndpoint, TransportKind,
};
use synapse_types::event::EventKind;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

/// Builds a connection for an endpoint. Pluggable so callers can supply
/// transports beyond the built-in HTTP one.
pub type ConnectionFactory =
    Box<dyn Fn(&ServiceEndpoint) -> Result<Arc<dyn Connection>, BusError> + Send + Sync>;

/// Result of `send_message`.
#[derive(Debug)]
pub enum SendOutcome {
    /// The message was enqueued; no response was requested.
    Accepted {
        /// The generated message id.
        message_id: String,
    },
    /// The correlated response.
    Response(Message),
}

/// Summary of a `connect_all` fan-out.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ConnectReport {
    /// Endpoints attempted.
    pub attempted: usize,
    /// Connections established.
    pub connected: usize,
    /// Connections that failed (the components are registered offline).
    pub failed: usize,
}

/// Aggregate bus state for callers.
#[derive(Debug, Clone, Serialize)]
pub struct EcosystemStatus {
    /// Components registered (any state).
    pub total_components: usize,
    /// Components currently online.
    pub online_components: usize,
    /// Messages waiting for dispatch.
    pub queued_messages: usize,
    /// Correlated requests awaiting a response.
    pub pending_requests: usize,
    /// Snapshot of every component record.
    pub components: Vec<ComponentStatus>,
    /// When this snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// The ecosystem message bus.
pub struct MessageBus {
    config: BusConfig,
    events: Arc<EventBroadcaster>,
    components: ComponentRegistry,
    endpoints: EndpointRegistry,
    connections: DashMap<String, Arc<dyn Connection>>,
    queue: Mutex<VecDeque<Message>>,
    pending: DashMap<String, oneshot::Sender<Message>>,
    factory: ConnectionFactory,
    shutdown_tx: watch::Sender<bool>,
    started: AtomicBool,
}

impl MessageBus {
    /// Create a bus with the built-in HTTP connection factory.
    pub fn new(config: BusConfig, events: Arc<EventBroadcaster>) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            config,
            events,
            components: ComponentRegistry::new(),
            endpoints: EndpointRegistry::new(),
            connections: DashMap::new(),
            queue: Mutex::new(VecDeque::new()),
            pending: DashMap::new(),
            factory: Box::new(default_factory),
            shutdown_tx,
            started: AtomicBool::new(false),
        }
    }

    /// Replace the connection factory (custom transports, tests).
    pub fn with_connection_factory(mut self, factory: ConnectionFactory) -> Self {
        self.factory = factory;
        self
    }

    /// Spawn the dispatch and heartbeat loops. Idempotent.
    pub fn start(self: &Arc<Self>) {
        if self.started.swap(true, Ordering::AcqRel) {
            return;
        }
        let bus = self.clone();
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move { bus.dispatch_loop(shutdown).await });

        let bus = self.clone();
        let shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move { bus.heartbeat_loop(shutdown).await });
        info!(self_id = %self.config.self_id, "Message bus started");
    }

    /// Stop the background loops. Idempotent.
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// The component registry.
    pub fn components(&self) -> &ComponentRegistry {
        &self.components
    }

    /// The endpoint registry.
    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    pub(crate) fn config(&self) -> &BusConfig {
        &self.config
    }

    pub(crate) fn events(&self) -> &EventBroadcaster {
        &self.events
    }

    pub(crate) fn connection(&self, component_id: &str) -> Option<Arc<dyn Connection>> {
        self.connections
            .get(component_id)
            .map(|entry| entry.value().clone())
    }

    /// Register a static endpoint descriptor.
    pub fn register_endpoint(&self, endpoint: ServiceEndpoint) {
        debug!(component = %endpoint.component_id, address = %endpoint.address, "Endpoint registered");
        self.endpoints.register(endpoint);
    }

    /// Register a component status record explicitly.
    pub async fn register_component(&self, status: ComponentStatus) {
        let component_id = status.id.clone();
        self.components.register(status);
        self.events
            .emit(EventKind::ComponentRegistered { component_id })
            .await;
    }

    /// Connect to a component's registered endpoint.
    ///
    /// Success registers the component online; failure registers it
    /// offline with a zeroed heartbeat. Either way the registry records
    /// the attempt.
    pub async fn connect(&self, component_id: &str) -> Result<(), BusError> {
        let endpoint = self
            .endpoints
            .get(component_id)
            .ok_or_else(|| BusError::UnknownEndpoint(component_id.to_string()))?;
        let outcome = self.establish(&endpoint).await;
        self.finish_connect(&endpoint, outcome).await
    }

    /// Connect using a caller-supplied connection (custom transports).
    /// The endpoint is registered as a side effect.
    pub async fn connect_with(
        &self,
        endpoint: &ServiceEndpoint,
        connection: Arc<dyn Connection>,
    ) -> Result<(), BusError> {
        self.endpoints.register(endpoint.clone());
        let outcome = if connection.health_check().await {
            Ok(connection)
        } else {
            Err(BusError::ConnectFailed {
                component_id: endpoint.component_id.clone(),
                reason: "liveness probe failed".to_string(),
            })
        };
        self.finish_connect(endpoint, outcome).await
    }

    /// Attempt every registered endpoint. Fan-out: one endpoint's
    /// failure never prevents attempting the others.
    pub async fn connect_all(&self) -> ConnectReport {
        let endpoints = self.endpoints.all();
        let results = join_all(
            endpoints
                .iter()
                .map(|endpoint| self.connect(&endpoint.component_id)),
        )
        .await;
        let connected = results.iter().filter(|r| r.is_ok()).count();
        ConnectReport {
            attempted: endpoints.len(),
            connected,
            failed: endpoints.len() - connected,
        }
    }

    async fn establish(&self, endpoint: &ServiceEndpoint) -> Result<Arc<dyn Connection>, BusError> {
        let connection = (self.factory)(endpoint)?;
        if connection.health_check().await {
            Ok(connection)
        } else {
            Err(BusError::ConnectFailed {
                component_id: endpoint.component_id.clone(),
                reason: "liveness probe failed".to_string(),
            })
        }
    }

    async fn finish_connect(
        &self,
        endpoint: &ServiceEndpoint,
        outcome: Result<Arc<dyn Connection>, BusError>,
    ) -> Result<(), BusError> {
        let id = endpoint.component_id.as_str();
        let newly_registered = !self.components.contains(id);
        match outcome {
            Ok(connection) => {
                self.connections.insert(id.to_string(), connection);
                let mut status = self
                    .components
                    .get(id)
                    .unwrap_or_else(|| ComponentStatus::new(id, id, ComponentState::Connecting));
                status.state = ComponentState::Online;
                status.last_heartbeat = Utc::now();
                if status.capabilities.is_empty() {
                    status.capabilities = endpoint.capabilities.clone();
                }
                self.components.register(status);
                if newly_registered {
                    self.events
                        .emit(EventKind::ComponentRegistered {
                            component_id: id.to_string(),
                        })
                        .await;
                }
                self.events
                    .emit(EventKind::ConnectionEstablished {
                        component_id: id.to_string(),
                    })
                    .await;
                info!(component = %id, "Connection established");
                Ok(())
            }
            Err(e) => {
                let status = self
                    .components
                    .get(id)
                    .map(|mut existing| {
                        existing.state = ComponentState::Offline;
                        existing
                    })
                    .unwrap_or_else(|| ComponentStatus::new(id, id, ComponentState::Offline))
                    .with_zeroed_heartbeat();
                self.components.register(status);
                self.events
                    .emit(EventKind::ConnectionFailed {
                        component_id: id.to_string(),
                        reason: e.to_string(),
                    })
                    .await;
                warn!(component = %id, error = %e, "Connection failed");
                Err(e)
            }
        }
    }

    /// Enqueue a message.
    ///
    /// Fire-and-forget messages are acknowledged immediately — even
    /// when the target has no connection, acceptance is optimistic by
    /// design. Messages expecting a response register a one-shot
    /// listener keyed by the message id and resolve when a response
    /// with a matching correlation id arrives, or reject after the
    /// configured timeout; the listener is removed on both outcomes.
    pub async fn send_message(&self, message: Message) -> Result<SendOutcome, BusError> {
        let message_id = message.id.clone();
        let target = message.target.clone();

        if !message.requires_response {
            self.enqueue(message);
            return Ok(SendOutcome::Accepted { message_id });
        }

        let (tx, rx) = oneshot::channel();
        self.pending.insert(message_id.clone(), tx);
        self.enqueue(message);

        let timeout = self.config.response_timeout;
        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => {
                let code = response
                    .payload
                    .pointer("/error/code")
                    .and_then(|c| c.as_str());
                if code == Some("target_not_connected") {
                    return Err(BusError::TargetNotConnected(target));
                }
                Ok(SendOutcome::Response(response))
            }
            Ok(Err(_)) => Err(BusError::QueueClosed),
            Err(_) => {
                // Abandon the request. The underlying send is not
                // cancelled; a late response finds no listener and is
                // silently dropped.
                self.pending.remove(&message_id);
                Err(BusError::Timeout(timeout.as_millis() as u64))
            }
        }
    }

    fn enqueue(&self, message: Message) {
        let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.push_back(message);
    }

    /// Messages waiting for dispatch.
    pub fn queued_messages(&self) -> usize {
        let queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        queue.len()
    }

    /// Correlated requests still waiting for a response.
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Aggregate snapshot for callers.
    pub fn ecosystem_status(&self) -> EcosystemStatus {
        EcosystemStatus {
            total_components: self.components.total_count(),
            online_components: self.components.online_count(),
            queued_messages: self.queued_messages(),
            pending_requests: self.pending_requests(),
            components: self.components.all(),
            timestamp: Utc::now(),
        }
    }

    /// Run one heartbeat sweep now (also runs periodically once started).
    pub async fn heartbeat_sweep(&self) -> HeartbeatSummary {
        heartbeat::sweep(self).await
    }

    async fn dispatch_loop(&self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }
            let next = {
                let mut queue = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                queue.pop_front()
            };
            match next {
                Some(message) => self.dispatch_one(message).await,
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.dispatch_idle_delay) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
        debug!("Dispatch loop stopped");
    }

    async fn dispatch_one(&self, message: Message) {
        // Responses produced by local components resolve their waiting
        // listener directly.
        if message.kind == MessageKind::Response {
            if let Some(correlation_id) = message.correlation_id.clone() {
                if self.pending.contains_key(&correlation_id) {
                    self.resolve_response(&correlation_id, message);
                    return;
                }
            }
        }

        let connection = self.connection(&message.target);
        let Some(connection) = connection else {
            if message.requires_response {
                // Unreachable targets fail fast, not via timeout, so
                // callers can tell "no connection" from "connected but
                // unresponsive".
                let response = Message::response_to(
                    &message,
                    self.config.self_id.clone(),
                    json!({ "error": { "code": "target_not_connected", "target": message.target } }),
                );
                self.resolve_response(&message.id, response);
            } else {
                debug!(target = %message.target, "Dropping message for unconnected target");
            }
            return;
        };

        match connection.send(&message).await {
            Ok(payload) => {
                self.components.touch_heartbeat(&message.target);
                if message.requires_response {
                    let response = Message::response_to(&message, message.target.clone(), payload);
                    self.resolve_response(&message.id, response);
                }
            }
            Err(e) => {
                warn!(target = %message.target, error = %e, "Connection send failed");
                if message.requires_response {
                    let response = Message::response_to(
                        &message,
                        self.config.self_id.clone(),
                        json!({ "error": { "code": "send_failed", "detail": e.to_string() } }),
                    );
                    self.resolve_response(&message.id, response);
                }
            }
        }
    }

    fn resolve_response(&self, correlation_id: &str, response: Message) {
        match self.pending.remove(correlation_id) {
            Some((_, tx)) => {
                let _ = tx.send(response);
            }
            None => {
                debug!(correlation = %correlation_id, "Dropping response with no listener");
            }
        }
    }

    async fn heartbeat_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.heartbeat_sweep().await;
                }
                _ = shutdown.changed() => break,
            }
        }
        debug!("Heartbeat loop stopped");
    }
}

fn default_factory(endpoint: &ServiceEndpoint) -> Result<Arc<dyn Connection>, BusError> {
    match endpoint.transport {
        TransportKind::RequestResponse => Ok(Arc::new(HttpConnection::new(endpoint.clone())?)),
        other => Err(BusError::ConnectFailed {
            component_id: endpoint.component_id.clone(),
            reason: format!("no built-in connection for {other:?} transport"),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::time::{Duration, Instant};
    use synapse_types::component::MessageKind;

    struct MockConnection {
        healthy: bool,
        reply: serde_json::Value,
        delay: Option<Duration>,
        sent: Mutex<Vec<Message>>,
    }

    impl MockConnection {
        fn new(reply: serde_json::Value) -> Arc<Self> {
            Arc::new(Self {
                healthy: true,
                reply,
                delay: None,
                sent: Mutex::new(Vec::new()),
            })
        }

        fn slow(reply: serde_json::Value, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                healthy: true,
                reply,
                delay: Some(delay),
                sent: Mutex::new(Vec::new()),
            })
        }

        fn sent_count(&self) -> usize {
            self.sent.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Connection for MockConnection {
        async fn send(&self, message: &Message) -> Result<serde_json::Value, BusError> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            self.sent.lock().unwrap().push(message.clone());
            Ok(self.reply.clone())
        }

        async fn health_check(&self) -> bool {
            self.healthy
        }
    }

    fn endpoint(id: &str) -> ServiceEndpoint {
        ServiceEndpoint {
            component_id: id.to_string(),
            transport: TransportKind::RequestResponse,
            address: format!("http://localhost:0/{id}"),
            auth: None,
            health_path: Some("/healthz".to_string()),
            capabilities: vec!["echo".to_string()],
        }
    }

    fn test_config() -> BusConfig {
        BusConfig {
            dispatch_idle_delay: Duration::from_millis(5),
            response_timeout: Duration::from_millis(500),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_register_component_emits_event() {
        let events = Arc::new(EventBroadcaster::new());
        let bus = MessageBus::new(test_config(), events.clone());
        bus.register_component(ComponentStatus::new("wallet", "Wallet", ComponentState::Online))
            .await;

        assert!(bus.components().contains("wallet"));
        let history = events.history(5).await;
        assert!(history.iter().any(|e| matches!(
            &e.kind,
            EventKind::ComponentRegistered { component_id } if component_id == "wallet"
        )));
    }

    #[tokio::test]
    async fn test_fire_and_forget_is_optimistic() {
        let events = Arc::new(EventBroadcaster::new());
        let bus = Arc::new(MessageBus::new(test_config(), events));
        bus.start();

        // No endpoint, no connection: still accepted.
        let outcome = bus
            .send_message(Message::new(
                "shell",
                "ghost",
                MessageKind::Event,
                json!({"note": "anyone?"}),
            ))
            .await
            .unwrap();
        assert!(matches!(outcome, SendOutcome::Accepted { .. }));

        // The dispatch loop drains it without error.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(bus.queued_messages(), 0);
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_unconnected_target_fails_fast() {
        let events = Arc::new(EventBroadcaster::new());
        let config = BusConfig {
            response_timeout: Duration::from_secs(5),
            dispatch_idle_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let bus = Arc::new(MessageBus::new(config, events));
        bus.start();

        let started = Instant::now();
        let err = bus
            .send_message(
                Message::new("shell", "ghost", MessageKind::Query, json!({}))
                    .expecting_response(),
            )
            .await
            .unwrap_err();
        let elapsed = started.elapsed();

        assert!(matches!(err, BusError::TargetNotConnected(ref t) if t == "ghost"), "got: {err}");
        // Strictly faster than the timeout — this is the fast-fail path.
        assert!(elapsed < Duration::from_secs(1), "took {elapsed:?}");
        assert_eq!(bus.pending_requests(), 0);
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_correlated_request_response() {
        let events = Arc::new(EventBroadcaster::new());
        let bus = Arc::new(MessageBus::new(test_config(), events));
        let connection = MockConnection::new(json!({"balance": 5}));
        bus.connect_with(&endpoint("wallet"), connection.clone())
            .await
            .unwrap();
        bus.start();

        let request = Message::new("shell", "wallet", MessageKind::Query, json!({"q": "balance"}))
            .expecting_response();
        let request_id = request.id.clone();
        let outcome = bus.send_message(request).await.unwrap();

        match outcome {
            SendOutcome::Response(response) => {
                assert_eq!(response.payload, json!({"balance": 5}));
                assert_eq!(response.correlation_id.as_deref(), Some(request_id.as_str()));
                assert_eq!(response.kind, MessageKind::Response);
            }
            other => panic!("expected response, got {other:?}"),
        }
        assert_eq!(connection.sent_count(), 1);
        assert_eq!(bus.pending_requests(), 0);
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_timeout_removes_listener_and_drops_phantom() {
        let events = Arc::new(EventBroadcaster::new());
        let config = BusConfig {
            response_timeout: Duration::from_millis(50),
            dispatch_idle_delay: Duration::from_millis(5),
            ..Default::default()
        };
        let bus = Arc::new(MessageBus::new(config, events));
        let connection = MockConnection::slow(json!({"late": true}), Duration::from_millis(300));
        bus.connect_with(&endpoint("slowpoke"), connection.clone())
            .await
            .unwrap();
        bus.start();

        let err = bus
            .send_message(
                Message::new("shell", "slowpoke", MessageKind::Query, json!({}))
                    .expecting_response(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, BusError::Timeout(50)), "got: {err}");
        assert_eq!(bus.pending_requests(), 0);

        // The underlying send completes later; the phantom response has
        // no listener and no observable effect.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(connection.sent_count(), 1);
        assert_eq!(bus.pending_requests(), 0);
        assert_eq!(bus.queued_messages(), 0);
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_connect_all_fans_out() {
        let events = Arc::new(EventBroadcaster::new());
        let bus = MessageBus::new(test_config(), events.clone()).with_connection_factory(
            Box::new(|endpoint| {
                if endpoint.component_id == "alpha" {
                    Ok(MockConnection::new(json!({"ok": true})) as Arc<dyn Connection>)
                } else {
                    Err(BusError::ConnectFailed {
                        component_id: endpoint.component_id.clone(),
                        reason: "refused".to_string(),
                    })
                }
            }),
        );
        bus.register_endpoint(endpoint("alpha"));
        bus.register_endpoint(endpoint("beta"));

        let report = bus.connect_all().await;
        assert_eq!(report.attempted, 2);
        assert_eq!(report.connected, 1);
        assert_eq!(report.failed, 1);

        let alpha = bus.components().get("alpha").unwrap();
        assert_eq!(alpha.state, ComponentState::Online);
        assert_eq!(alpha.capabilities, vec!["echo".to_string()]);
        let beta = bus.components().get("beta").unwrap();
        assert_eq!(beta.state, ComponentState::Offline);
        assert_eq!(beta.last_heartbeat.timestamp(), 0);

        let history = events.history(20).await;
        assert!(history
            .iter()
            .any(|e| matches!(e.kind, EventKind::ConnectionEstablished { .. })));
        assert!(history
            .iter()
            .any(|e| matches!(e.kind, EventKind::ConnectionFailed { .. })));

        let status = bus.ecosystem_status();
        assert_eq!(status.total_components, 2);
        assert_eq!(status.online_components, 1);
    }

    #[tokio::test]
    async fn test_fifo_dispatch_order() {
        let events = Arc::new(EventBroadcaster::new());
        let bus = Arc::new(MessageBus::new(test_config(), events));
        let connection = MockConnection::new(json!({"ok": true}));
        bus.connect_with(&endpoint("sink"), connection.clone())
            .await
            .unwrap();

        for n in 0..5 {
            bus.send_message(Message::new(
                "shell",
                "sink",
                MessageKind::Command,
                json!({"seq": n}),
            ))
            .await
            .unwrap();
        }
        bus.start();
        tokio::time::sleep(Duration::from_millis(100)).await;

        let sent = connection.sent.lock().unwrap();
        let sequence: Vec<i64> = sent
            .iter()
            .map(|m| m.payload["seq"].as_i64().unwrap())
            .collect();
        assert_eq!(sequence, vec![0, 1, 2, 3, 4]);
        bus.shutdown();
    }
}
