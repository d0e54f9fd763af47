//! Low-rank adapter weight updates.

use serde::{Deserialize, Serialize};

/// A named low-rank weight delta, ready to hand to a guest module.
///
/// Constructed by the skill protocol layer, which validates rank and
/// weight buffer shapes; consumed exactly once by the bridge's
/// load-adapter call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterUpdate {
    /// Skill identifier this adapter was produced for.
    pub skill_id: String,
    /// Human-readable adapter name.
    pub name: String,
    /// Dense weight matrix A, row-major.
    pub weights_a: Vec<f32>,
    /// Dense weight matrix B, row-major.
    pub weights_b: Vec<f32>,
    /// Decomposition rank. Always > 0 for a validated update.
    pub rank: u32,
    /// Scaling numerator.
    pub alpha: f32,
}

impl AdapterUpdate {
    /// Effective scaling factor applied to the delta: `alpha / rank`.
    pub fn scale(&self) -> f32 {
        self.alpha / self.rank as f32
    }
}
