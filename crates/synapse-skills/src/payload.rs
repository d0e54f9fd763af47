//! Skill payload schema.
//!
//! A skill payload is the serialized response of a skill-invocation
//! round trip. The adapter weights travel as base64-encoded raw byte
//! buffers inside the JSON record; the binary layout of those buffers
//! is 4-byte big-endian f32 groups (see [`crate::weights`]).

use serde::{Deserialize, Serialize};

/// Envelope of a skill-invocation response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillResponse {
    /// Correlates the response to the invocation that produced it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    /// Producer-side status string.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// The skill record. Absent when the invocation produced nothing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skill: Option<SkillRecord>,
}

/// A learned skill: identity plus the low-rank weight delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillRecord {
    /// Skill identifier.
    pub skill_id: String,
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Base64-encoded raw bytes of weight matrix A.
    pub weights_a: String,
    /// Base64-encoded raw bytes of weight matrix B.
    pub weights_b: String,
    /// Decomposition rank.
    pub rank: u32,
    /// Scaling numerator.
    pub alpha: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skill_response_without_record() {
        let resp: SkillResponse =
            serde_json::from_str(r#"{"request_id": "r-1", "status": "empty"}"#).unwrap();
        assert!(resp.skill.is_none());
        assert_eq!(resp.request_id.as_deref(), Some("r-1"));
    }

    #[test]
    fn test_skill_record_roundtrip() {
        let record = SkillRecord {
            skill_id: "skill-7".to_string(),
            name: "navigation".to_string(),
            weights_a: "AAAA".to_string(),
            weights_b: "BBBB".to_string(),
            rank: 8,
            alpha: 16.0,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: SkillRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.skill_id, "skill-7");
        assert_eq!(back.rank, 8);
    }
}
