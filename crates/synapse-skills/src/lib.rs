//! Adapter-application protocol.
//!
//! Decodes a binary skill payload into a validated [`AdapterUpdate`]
//! and drives the bridge's load-adapter capability. Application is
//! all-or-nothing: either the whole adapter loads or none of it does.

mod apply;
mod error;
mod payload;
mod weights;

pub use apply::{decode_payload, SkillApplicator};
pub use error::SkillError;
pub use payload::{SkillRecord, SkillResponse};
pub use weights::{decode_weights, scale};
