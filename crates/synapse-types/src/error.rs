//! Shared error types for the Synapse system.

use thiserror::Error;

/// Top-level error type for the Synapse system.
///
/// Subsystems define their own narrower enums (`BridgeError`, `SkillError`,
/// `BusError`, `RuntimeError`) and convert into this umbrella at crate
/// boundaries.
#[derive(Error, Debug)]
pub enum SynapseError {
    /// Guest bytecode failed to compile.
    #[error("Module compilation failed: {0}")]
    Compile(String),

    /// A compiled module could not be instantiated.
    #[error("Module instantiation failed: {0}")]
    Instantiation(String),

    /// The guest does not export a required capability.
    #[error("Missing capability: {0}")]
    MissingCapability(String),

    /// The guest trapped during a call.
    #[error("Guest execution trap: {0}")]
    ExecutionTrap(String),

    /// An adapter weight buffer was malformed.
    #[error("Malformed adapter weights: {0}")]
    MalformedWeights(String),

    /// The adapter configuration was invalid (e.g., zero rank).
    #[error("Invalid adapter config: {0}")]
    InvalidAdapterConfig(String),

    /// A skill payload carried no skill record.
    #[error("Empty skill payload")]
    EmptyPayload,

    /// A correlated bus request timed out.
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    /// A message targeted a component with no live connection.
    #[error("Target not connected: {0}")]
    TargetNotConnected(String),

    /// The orchestrator was invoked before `start()`.
    #[error("Orchestrator is not running")]
    NotRunning,

    /// The component is in the wrong state for the requested operation.
    #[error("Invalid state '{current}' for operation '{operation}'")]
    InvalidState {
        /// The current state.
        current: String,
        /// The operation that was attempted.
        operation: String,
    },

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A configuration error occurred.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<serde_json::Error> for SynapseError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Alias for Result with SynapseError.
pub type SynapseResult<T> = Result<T, SynapseError>;
