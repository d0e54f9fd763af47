//! Skill protocol error taxonomy.

use synapse_bridge::BridgeError;
use synapse_types::SynapseError;
use thiserror::Error;

/// Errors from the adapter-application protocol.
///
/// Each of these is fatal to the `apply_skill` call it occurred in;
/// partial application is never possible.
#[derive(Debug, Error)]
pub enum SkillError {
    /// The payload carried no nested skill record.
    #[error("Empty skill payload")]
    EmptyPayload,

    /// A weight buffer could not be converted to f32 values.
    #[error("Malformed adapter weights: {0}")]
    MalformedWeights(String),

    /// The adapter scalars were invalid.
    #[error("Invalid adapter config: {0}")]
    InvalidAdapterConfig(String),

    /// The payload failed to deserialize against the skill schema.
    #[error("Skill payload decode failed: {0}")]
    Decode(String),

    /// The bridge call failed.
    #[error("Bridge error: {0}")]
    Bridge(#[from] BridgeError),
}

impl From<SkillError> for SynapseError {
    fn from(e: SkillError) -> Self {
        match e {
            SkillError::EmptyPayload => SynapseError::EmptyPayload,
            SkillError::MalformedWeights(m) => SynapseError::MalformedWeights(m),
            SkillError::InvalidAdapterConfig(m) => SynapseError::InvalidAdapterConfig(m),
            SkillError::Decode(m) => SynapseError::Serialization(m),
            SkillError::Bridge(b) => b.into(),
        }
    }
}
