//! Ecosystem message bus.
//!
//! Maintains a registry of external service components and their
//! reachability endpoints, queues and dispatches messages between them,
//! correlates request/response pairs with timeouts, and runs a periodic
//! heartbeat sweep. Components are pluggable [`Connection`]s; the bus
//! itself depends only on the event broadcaster.

mod bus;
mod config;
mod connection;
mod error;
mod heartbeat;
mod registry;

pub use bus::{ConnectReport, ConnectionFactory, EcosystemStatus, MessageBus, SendOutcome};
pub use config::BusConfig;
pub use connection::{Connection, HttpConnection};
pub use error::BusError;
pub use heartbeat::HeartbeatSummary;
pub use registry::{ComponentRegistry, EndpointRegistry};
