//! Orchestrator error taxonomy.

use synapse_bridge::BridgeError;
use synapse_types::SynapseError;
use thiserror::Error;

/// Errors from orchestrator operations.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// `process_input` was invoked before `start()` (or after shutdown).
    #[error("Orchestrator is not running")]
    NotRunning,

    /// The orchestrator is in the wrong state for the operation.
    #[error("Invalid state '{current}' for operation '{operation}'")]
    InvalidState {
        /// The current state.
        current: String,
        /// The operation that was attempted.
        operation: String,
    },

    /// A module failed to load and no degraded path was available.
    #[error("Module load failed: {0}")]
    ModuleLoad(String),

    /// A bridge call failed.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// A configuration file could not be read or parsed.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<RuntimeError> for SynapseError {
    fn from(e: RuntimeError) -> Self {
        match e {
            RuntimeError::NotRunning => SynapseError::NotRunning,
            RuntimeError::InvalidState { current, operation } => {
                SynapseError::InvalidState { current, operation }
            }
            RuntimeError::ModuleLoad(m) => SynapseError::Instantiation(m),
            RuntimeError::Bridge(b) => b.into(),
            RuntimeError::Config(m) => SynapseError::Config(m),
            RuntimeError::Io(e) => SynapseError::Io(e),
        }
    }
}
