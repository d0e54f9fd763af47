//! Bus error taxonomy.

use synapse_types::SynapseError;
use thiserror::Error;

/// Errors from message bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// A correlated request expired before its response arrived.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// The target component has no live connection. Raised immediately
    /// by the dispatch loop, never via timeout.
    #[error("Target not connected: {0}")]
    TargetNotConnected(String),

    /// No endpoint is registered for the component.
    #[error("No endpoint registered for component: {0}")]
    UnknownEndpoint(String),

    /// A connection attempt failed.
    #[error("Connection to {component_id} failed: {reason}")]
    ConnectFailed {
        /// The component whose endpoint was unreachable.
        component_id: String,
        /// Why the attempt failed.
        reason: String,
    },

    /// The bus was shut down while an operation was pending.
    #[error("Message bus is shut down")]
    QueueClosed,

    /// A transport-level send failed.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl From<BusError> for SynapseError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::Timeout(ms) => SynapseError::Timeout(ms),
            BusError::TargetNotConnected(t) => SynapseError::TargetNotConnected(t),
            BusError::UnknownEndpoint(m) => SynapseError::Config(m),
            BusError::ConnectFailed {
                component_id,
                reason,
            } => SynapseError::Internal(format!("connect {component_id}: {reason}")),
            BusError::QueueClosed => SynapseError::Internal("bus shut down".to_string()),
            BusError::Transport(m) => SynapseError::Internal(m),
        }
    }
}
