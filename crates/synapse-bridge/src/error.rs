//! Bridge error taxonomy.

use synapse_types::SynapseError;
use thiserror::Error;

/// Errors from bridge operations.
///
/// All of these are scoped to a single load attempt or a single call;
/// none of them is fatal to the orchestrator.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The guest bytecode failed to compile.
    #[error("WASM compilation failed: {0}")]
    Compile(String),

    /// The compiled module could not be instantiated.
    #[error("WASM instantiation failed: {0}")]
    Instantiation(String),

    /// The export table is too sparse to be the expected kind of module.
    #[error("Export table too sparse: {present} of {required} required capabilities present")]
    MissingExports {
        /// Required capabilities that resolved to an export.
        present: usize,
        /// Size of the required capability set.
        required: usize,
    },

    /// A capability did not resolve to a callable export.
    #[error("Missing capability: {0}")]
    MissingCapability(String),

    /// The guest trapped during a call.
    #[error("Guest execution trap: {0}")]
    Trap(String),

    /// A guest memory access was out of bounds or the module exposes no
    /// allocator for host-side writes.
    #[error("Guest memory error: {0}")]
    Memory(String),

    /// A payload failed to serialize or parse at the boundary.
    #[error("Boundary serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<BridgeError> for SynapseError {
    fn from(e: BridgeError) -> Self {
        match e {
            BridgeError::Compile(m) => SynapseError::Compile(m),
            BridgeError::Instantiation(m) => SynapseError::Instantiation(m),
            BridgeError::MissingExports { present, required } => SynapseError::Instantiation(
                format!("export table too sparse ({present}/{required} capabilities)"),
            ),
            BridgeError::MissingCapability(m) => SynapseError::MissingCapability(m),
            BridgeError::Trap(m) => SynapseError::ExecutionTrap(m),
            BridgeError::Memory(m) => SynapseError::ExecutionTrap(m),
            BridgeError::Serialization(m) => SynapseError::Serialization(m),
        }
    }
}
